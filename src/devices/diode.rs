//! §4.3 diode: the Shockley large-signal model, linearized every Newton
//! iteration around the previous-iterate junction voltage.
//!
//! Grounded on the teacher's `linearize`/`stamp_nonlinear` (same conductance
//! and equivalent-current derivation, same `pos`/`neg` RHS sign convention:
//! current flows from `positive` to `negative` through the junction, so the
//! equivalent current is subtracted at `positive` and added at `negative`).
//! The exponential clamp is kept from the teacher; voltage limiting is new,
//! following §4.2's note to limit the per-iteration junction-voltage step
//! logarithmically rather than merely clamping the exponent argument.

use std::cell::Cell;

use super::stamp::NodePairStamp;
use super::{Biasing, DeviceError, DeviceResult, Frequency};
use crate::circuit::{Entity, NodeMap};
use crate::scalar::{Complex, Scalar};
use crate::solver::SparseMatrix;
use crate::state::SimulationState;
use crate::util::{node_ref, stamp_rhs_current};

const DEFAULT_THERMAL_VOLTAGE: f64 = 0.02585;
const DEFAULT_EXP_LIMIT: f64 = 40.0;

#[derive(Debug, Clone)]
pub struct Diode {
    pub name: String,
    positive_name: String,
    negative_name: String,
    positive: Option<usize>,
    negative: Option<usize>,
    /// Saturation current (A).
    pub saturation_current: f64,
    /// Emission coefficient (dimensionless).
    pub emission_coeff: f64,
    /// Thermal voltage (Vt) used in `exp(Vd / (n * Vt))`.
    pub thermal_voltage: f64,
    /// Clamp limit for `Vd/(n*Vt)` to keep `exp()` bounded.
    pub exp_limit: f64,
    stamp: NodePairStamp,
    stamp_ac: NodePairStamp,
    /// Last accepted junction voltage, the previous-iterate anchor for
    /// logarithmic voltage limiting.
    last_vd: Cell<f64>,
    /// Small-signal conductance at the last bias point, reused for AC.
    conductance: Cell<f64>,
}

impl Diode {
    pub fn from_entity(e: &Entity) -> DeviceResult<Self> {
        if e.nodes.len() != 2 {
            return Err(DeviceError::BadConnection {
                entity: e.name.clone(),
                reason: format!("diode needs 2 nodes, got {}", e.nodes.len()),
            });
        }
        let saturation_current = e.params.get_or("is", 1e-14);
        if saturation_current <= 0.0 {
            return Err(DeviceError::InvalidParameter {
                entity: e.name.clone(),
                reason: "saturation current must be positive".to_string(),
            });
        }
        let emission_coeff = e.params.get_or("n", 1.0);
        Ok(Self {
            name: e.name.clone(),
            positive_name: e.nodes[0].clone(),
            negative_name: e.nodes[1].clone(),
            positive: None,
            negative: None,
            saturation_current,
            emission_coeff,
            thermal_voltage: DEFAULT_THERMAL_VOLTAGE,
            exp_limit: DEFAULT_EXP_LIMIT,
            stamp: NodePairStamp::uninitialized(),
            stamp_ac: NodePairStamp::uninitialized(),
            last_vd: Cell::new(0.0),
            conductance: Cell::new(0.0),
        })
    }

    pub(crate) fn register_nodes(&mut self, nodes: &mut NodeMap) -> DeviceResult<()> {
        self.positive = node_ref(nodes.insert_node(&self.positive_name));
        self.negative = node_ref(nodes.insert_node(&self.negative_name));
        Ok(())
    }

    pub(crate) fn bind(&mut self, matrix: &mut SparseMatrix<f64>) -> DeviceResult<()> {
        self.stamp = NodePairStamp::bind(matrix, self.positive, self.negative)?;
        Ok(())
    }

    pub(crate) fn bind_ac(&mut self, matrix: &mut SparseMatrix<Complex>) -> DeviceResult<()> {
        self.stamp_ac = NodePairStamp::bind(matrix, self.positive, self.negative)?;
        Ok(())
    }

    /// Limits the per-iteration junction-voltage step logarithmically: steps
    /// larger than `2*Vt` are compressed, keeping the exponential model's
    /// conductance from blowing up the Newton update.
    fn limit_step(v_new: f64, v_old: f64, vt: f64) -> f64 {
        let delta = v_new - v_old;
        if delta.abs() <= 2.0 * vt {
            v_new
        } else if delta > 0.0 {
            v_old + vt * (1.0 + delta / vt).ln()
        } else {
            v_old - vt * (1.0 + (-delta) / vt).ln()
        }
    }

    /// Shockley model: `I = Is * (exp(Vd / (n*Vt)) - 1)`, linearized around
    /// `v_d` into `(conductance, equivalent current)`.
    fn linearize(&self, v_d: f64) -> (f64, f64) {
        let nvt = self.emission_coeff * self.thermal_voltage;
        let isat = self.saturation_current;

        let limited = Self::limit_step(v_d, self.last_vd.get(), self.thermal_voltage);
        let v_eff = limited.clamp(-self.exp_limit * nvt, self.exp_limit * nvt);
        self.last_vd.set(v_eff);

        let x = v_eff / nvt;
        let exp_v = x.exp();
        let i = isat * x.exp_m1();
        let g = isat * exp_v / nvt;
        let i_eq = i - g * v_eff;
        self.conductance.set(g);
        (g, i_eq)
    }
}

impl Biasing for Diode {
    fn load_bias(&self, matrix: &mut SparseMatrix<f64>, state: &mut SimulationState) {
        let v_d = state.voltage_diff(self.positive, self.negative);
        let (g, i_eq) = self.linearize(v_d);
        self.stamp.stamp_conductance(matrix, g);
        stamp_rhs_current(&mut state.rhs, self.positive, self.negative, -i_eq);
    }
}

impl Frequency for Diode {
    fn load_frequency(&self, matrix: &mut SparseMatrix<Complex>, _rhs: &mut [Complex], _omega: f64) {
        self.stamp_ac
            .stamp_conductance(matrix, Complex::from_real(self.conductance.get()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::ParameterSet;

    #[test]
    fn diode_forward_bias_conducts() {
        let e = Entity::new("D1", &["a", "0"], ParameterSet::new().with("is", 1e-14));
        let mut d = Diode::from_entity(&e).unwrap();
        let mut nodes = NodeMap::new();
        d.register_nodes(&mut nodes).unwrap();
        let mut m = SparseMatrix::<f64>::new(nodes.mna_matrix_dim());
        d.bind(&mut m).unwrap();
        m.fix_equations();
        let mut state = SimulationState::new(nodes.mna_matrix_dim(), 27.0);
        state.previous[1] = 0.6;
        d.load_bias(&mut m, &mut state);
        assert!(m.value_at(1, 1) > 0.0);
    }

    #[test]
    fn zero_saturation_current_is_invalid() {
        let e = Entity::new("D1", &["a", "0"], ParameterSet::new().with("is", 0.0));
        assert!(Diode::from_entity(&e).is_err());
    }
}
