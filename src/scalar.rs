//! The field the sparse matrix and solver are generic over.
//!
//! Two instantiations ship: `f64` for real analyses (bias, transient) and
//! [`Complex`] for AC analysis. `Complex` is hand-rolled rather than built on
//! `num-complex` because the division and magnitude here use Smith's
//! algorithm and `f64::hypot` instead of the textbook formulas, which keeps
//! the Markowitz threshold test well-behaved near resonance peaks where
//! naive `re*re + im*im` can overflow or lose precision.

use num_traits::Zero;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

pub trait Scalar:
    Copy
    + fmt::Debug
    + fmt::Display
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + PartialEq
    + Zero
{
    /// `|x|`, used by the Markowitz threshold test and LU pivot validation.
    fn magnitude(self) -> f64;
    /// `1/x`. Never called on a value for which `is_exact_zero` holds.
    fn recip_scalar(self) -> Self;
    /// Exact (bitwise) zero test, as opposed to "small enough to treat as zero".
    fn is_exact_zero(self) -> bool;
    fn from_real(x: f64) -> Self;
}

impl Scalar for f64 {
    fn magnitude(self) -> f64 {
        self.abs()
    }
    fn recip_scalar(self) -> Self {
        1.0 / self
    }
    fn is_exact_zero(self) -> bool {
        self == 0.0
    }
    fn from_real(x: f64) -> Self {
        x
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub const ZERO: Complex = Complex { re: 0.0, im: 0.0 };

    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    pub fn from_polar(r: f64, theta: f64) -> Self {
        Self::new(r * theta.cos(), r * theta.sin())
    }

    pub fn conj(self) -> Self {
        Self::new(self.re, -self.im)
    }
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.im >= 0.0 {
            write!(f, "{}+{}i", self.re, self.im)
        } else {
            write!(f, "{}{}i", self.re, self.im)
        }
    }
}

impl Add for Complex {
    type Output = Complex;
    fn add(self, rhs: Complex) -> Complex {
        Complex::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for Complex {
    type Output = Complex;
    fn sub(self, rhs: Complex) -> Complex {
        Complex::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl Neg for Complex {
    type Output = Complex;
    fn neg(self) -> Complex {
        Complex::new(-self.re, -self.im)
    }
}

impl Mul for Complex {
    type Output = Complex;
    fn mul(self, rhs: Complex) -> Complex {
        Complex::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

/// Smith's algorithm: scale by the larger component before dividing, so
/// neither the numerator nor denominator product can overflow independently.
impl Div for Complex {
    type Output = Complex;
    fn div(self, rhs: Complex) -> Complex {
        if rhs.re.abs() >= rhs.im.abs() {
            let r = rhs.im / rhs.re;
            let denom = rhs.re + rhs.im * r;
            Complex::new((self.re + self.im * r) / denom, (self.im - self.re * r) / denom)
        } else {
            let r = rhs.re / rhs.im;
            let denom = rhs.re * r + rhs.im;
            Complex::new((self.re * r + self.im) / denom, (self.im * r - self.re) / denom)
        }
    }
}

impl AddAssign for Complex {
    fn add_assign(&mut self, rhs: Complex) {
        *self = *self + rhs;
    }
}

impl SubAssign for Complex {
    fn sub_assign(&mut self, rhs: Complex) {
        *self = *self - rhs;
    }
}

impl Zero for Complex {
    fn zero() -> Self {
        Complex::ZERO
    }
    fn is_zero(&self) -> bool {
        self.re == 0.0 && self.im == 0.0
    }
}

impl Scalar for Complex {
    fn magnitude(self) -> f64 {
        self.re.hypot(self.im)
    }
    fn recip_scalar(self) -> Self {
        Complex::new(1.0, 0.0) / self
    }
    fn is_exact_zero(self) -> bool {
        self.re == 0.0 && self.im == 0.0
    }
    fn from_real(x: f64) -> Self {
        Complex::new(x, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complex_mul_matches_textbook() {
        let a = Complex::new(1.0, 2.0);
        let b = Complex::new(3.0, -1.0);
        let p = a * b;
        assert_eq!(p, Complex::new(5.0, 5.0));
    }

    #[test]
    fn complex_div_roundtrip() {
        let a = Complex::new(4.0, -7.0);
        let b = Complex::new(-2.5, 3.1);
        let q = a / b;
        let back = q * b;
        assert!((back.re - a.re).abs() < 1e-9);
        assert!((back.im - a.im).abs() < 1e-9);
    }

    #[test]
    fn complex_div_avoids_overflow_near_extremes() {
        let huge = 1e250;
        let a = Complex::new(huge, huge);
        let b = Complex::new(huge, -huge);
        let q = a / b;
        assert!(q.re.is_finite() && q.im.is_finite());
    }

    #[test]
    fn magnitude_uses_hypot() {
        let c = Complex::new(3.0, 4.0);
        assert_eq!(c.magnitude(), 5.0);
    }

    #[test]
    fn f64_scalar_impl() {
        assert_eq!(Scalar::magnitude(-3.0f64), 3.0);
        assert_eq!(Scalar::recip_scalar(4.0f64), 0.25);
        assert!(Scalar::is_exact_zero(0.0f64));
        assert!(!Scalar::is_exact_zero(1e-300f64));
    }
}
