//! §4.4 Integration Method: Trapezoidal and Gear (BDF), the two formulas a
//! transient driver may select. Both turn a state's instantaneous value
//! (a device's charge or flux) into a derivative estimate plus the Jacobian
//! multiplier `ag[0]`, reading and writing through a private [`History`].

use std::fmt;

use super::history::{derivative_coefficients_at_node0, History, StateHandle};

/// The result of integrating a state variable at the current point: the
/// derivative estimate under the active formula, and `ag[0]`, the multiplier
/// a device scales its own `∂q/∂v` by to get the Jacobian conductance
/// contribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integration {
    pub derivative: f64,
    pub ag0: f64,
}

/// A device turns `q(v)` into `(dq/dt, ∂q/∂v · ag0)` through this interface,
/// and the transient driver advances it step to step. Object-safe so
/// [`crate::devices::Transient`] can take `&mut dyn IntegrationMethod`.
pub trait IntegrationMethod: fmt::Debug {
    fn order(&self) -> usize;
    fn max_order(&self) -> usize;
    /// `ag[0]`: the Jacobian multiplier for the *current* step.
    fn slope(&self) -> f64;
    fn time(&self) -> f64;
    fn delta(&self) -> f64;
    fn prev_delta(&self) -> f64;

    fn request_state(&mut self) -> StateHandle;

    /// Opens a new step at `time`, `delta` away from the last accepted point.
    fn begin_step(&mut self, time: f64, delta: f64);

    /// Writes `value` as the state's instantaneous value this iteration and
    /// returns the derivative/Jacobian pair under the active formula.
    fn integrate(&mut self, handle: StateHandle, value: f64) -> Integration;

    /// Local truncation error contribution `τ_i` for one state, comparing the
    /// just-integrated `value` against the history's degree-`order`
    /// extrapolation. `trtol` is the configured tolerance (§6, default 7.0);
    /// `chgtol` (§6, default 1e-14) floors the scale a state is judged
    /// against, so a state sitting near zero doesn't reject on noise alone.
    fn lte(&self, handle: StateHandle, value: f64, trtol: f64, chgtol: f64) -> f64;

    fn commit_step(&mut self);
    fn reject_step(&mut self);
    fn raise_order(&mut self);
    fn force_order_one(&mut self);
}

#[derive(Debug, Clone)]
pub struct Trapezoidal {
    history: History,
    last_derivative: Vec<f64>,
    pending_derivative: Vec<Option<f64>>,
    time: f64,
    delta: f64,
    prev_delta: f64,
}

impl Trapezoidal {
    pub fn new() -> Self {
        Self {
            history: History::new(4),
            last_derivative: Vec::new(),
            pending_derivative: Vec::new(),
            time: 0.0,
            delta: 0.0,
            prev_delta: 0.0,
        }
    }
}

impl Default for Trapezoidal {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegrationMethod for Trapezoidal {
    fn order(&self) -> usize {
        2
    }

    fn max_order(&self) -> usize {
        2
    }

    fn slope(&self) -> f64 {
        2.0 / self.delta
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn delta(&self) -> f64 {
        self.delta
    }

    fn prev_delta(&self) -> f64 {
        self.prev_delta
    }

    fn request_state(&mut self) -> StateHandle {
        self.last_derivative.push(0.0);
        self.pending_derivative.push(None);
        self.history.request_state()
    }

    fn begin_step(&mut self, time: f64, delta: f64) {
        self.time = time;
        self.delta = delta;
        self.history.begin_step(time);
        for p in &mut self.pending_derivative {
            *p = None;
        }
    }

    fn integrate(&mut self, handle: StateHandle, value: f64) -> Integration {
        let ag0 = self.slope();
        let prev_value = self.history.last_value(handle);
        let prev_derivative = self.last_derivative[handle.0];
        let derivative = ag0 * (value - prev_value) - prev_derivative;
        self.history.record(handle, value);
        self.pending_derivative[handle.0] = Some(derivative);
        Integration { derivative, ag0 }
    }

    fn lte(&self, handle: StateHandle, value: f64, trtol: f64, chgtol: f64) -> f64 {
        match self.history.predict(handle, 2) {
            Some(predicted) => (value - predicted).abs() / (3.0 * trtol * value.abs().max(chgtol)),
            None => 0.0,
        }
    }

    fn commit_step(&mut self) {
        self.history.commit();
        for (last, pending) in self.last_derivative.iter_mut().zip(self.pending_derivative.iter()) {
            if let Some(d) = pending {
                *last = *d;
            }
        }
        self.prev_delta = self.delta;
    }

    fn reject_step(&mut self) {
        self.history.rollback();
    }

    fn raise_order(&mut self) {}

    fn force_order_one(&mut self) {}
}

/// Gear/BDF, orders 1-6. The corrector coefficients are the general
/// variable-step backward-difference formula (see
/// [`derivative_coefficients_at_node0`]); order adapts between 1 and
/// `max_order` as the transient driver observes runs of accepted steps.
#[derive(Debug, Clone)]
pub struct Gear {
    history: History,
    max_order: usize,
    order: usize,
    time: f64,
    delta: f64,
    prev_delta: f64,
    coefficients: Vec<f64>,
}

impl Gear {
    pub fn new(max_order: usize) -> Self {
        let max_order = max_order.clamp(1, 6);
        Self {
            history: History::new(max_order + 2),
            max_order,
            order: 1,
            time: 0.0,
            delta: 0.0,
            prev_delta: 0.0,
            coefficients: vec![0.0, 0.0],
        }
    }

    fn effective_order(&self) -> usize {
        self.order.min(self.history.committed_len())
    }
}

impl IntegrationMethod for Gear {
    fn order(&self) -> usize {
        self.order
    }

    fn max_order(&self) -> usize {
        self.max_order
    }

    fn slope(&self) -> f64 {
        self.coefficients.first().copied().unwrap_or(1.0 / self.delta)
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn delta(&self) -> f64 {
        self.delta
    }

    fn prev_delta(&self) -> f64 {
        self.prev_delta
    }

    fn request_state(&mut self) -> StateHandle {
        self.history.request_state()
    }

    fn begin_step(&mut self, time: f64, delta: f64) {
        self.time = time;
        self.delta = delta;
        self.history.begin_step(time);
        let order = self.effective_order().max(1);
        let times = self.history.times_with_pending(order);
        self.coefficients = if times.len() >= 2 {
            derivative_coefficients_at_node0(&times)
        } else {
            vec![1.0 / delta, -1.0 / delta]
        };
    }

    fn integrate(&mut self, handle: StateHandle, value: f64) -> Integration {
        let order = self.coefficients.len() - 1;
        let values = self.history.values_with_pending(handle, value, order);
        let derivative: f64 = self
            .coefficients
            .iter()
            .zip(values.iter())
            .map(|(c, v)| c * v)
            .sum();
        self.history.record(handle, value);
        Integration {
            derivative,
            ag0: self.coefficients[0],
        }
    }

    fn lte(&self, handle: StateHandle, value: f64, trtol: f64, chgtol: f64) -> f64 {
        let order = self.effective_order();
        match self.history.predict(handle, order) {
            Some(predicted) => {
                (value - predicted).abs() / ((order as f64 + 1.0) * trtol * value.abs().max(chgtol))
            }
            None => 0.0,
        }
    }

    fn commit_step(&mut self) {
        self.history.commit();
        self.prev_delta = self.delta;
    }

    fn reject_step(&mut self) {
        self.history.rollback();
        self.order = 1;
    }

    fn raise_order(&mut self) {
        if self.order < self.max_order {
            self.order += 1;
        }
    }

    fn force_order_one(&mut self) {
        self.order = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trapezoidal_of_constant_value_has_zero_derivative() {
        let mut m = Trapezoidal::new();
        let s = m.request_state();
        m.begin_step(1.0, 1.0);
        m.integrate(s, 5.0);
        m.commit_step();
        for _ in 0..3 {
            m.begin_step(m.time() + 1.0, 1.0);
            let r = m.integrate(s, 5.0);
            m.commit_step();
            assert!(r.derivative.abs() < 1e-9);
        }
    }

    #[test]
    fn gear_backward_euler_matches_finite_difference_on_ramp() {
        let mut m = Gear::new(6);
        let s = m.request_state();
        let h = 0.5;
        let mut t = 0.0;
        let mut last = 0.0;
        for step in 1..4 {
            t += h;
            m.begin_step(t, h);
            let q = step as f64 * h;
            let r = m.integrate(s, q);
            m.commit_step();
            assert!((r.derivative - (q - last) / h).abs() < 1e-9);
            last = q;
        }
    }
}
