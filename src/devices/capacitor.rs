//! §4.3 capacitor: open at DC, a pure reactive admittance at AC, and a
//! companion-model conductance plus equivalent current in transient analysis.
//!
//! The transient stamp is grounded on the teacher's `stamp_trans` (conductance
//! at `pos_pos`/`neg_neg`, `-conductance` on the cross terms, equivalent
//! current added at `positive` and subtracted at `negative`); the charge is
//! handed to the active [`IntegrationMethod`] instead of a hand-rolled
//! backward-Euler/trapezoidal recurrence, so the same device code works under
//! any order of Gear/BDF as well as trapezoidal integration.

use super::stamp::NodePairStamp;
use super::{Biasing, DeviceError, DeviceResult, Frequency, Transient};
use crate::circuit::{Entity, NodeMap};
use crate::integration::{IntegrationMethod, StateHandle};
use crate::scalar::{Complex, Scalar};
use crate::solver::SparseMatrix;
use crate::state::SimulationState;
use crate::util::{node_ref, stamp_rhs_current};

#[derive(Debug, Clone)]
pub struct Capacitor {
    pub name: String,
    positive_name: String,
    negative_name: String,
    positive: Option<usize>,
    negative: Option<usize>,
    /// Capacitance (Farads).
    pub capacitance: f64,
    /// Initial condition voltage, used when `state.use_initial_conditions`.
    pub ic: f64,
    stamp: NodePairStamp,
    stamp_ac: NodePairStamp,
    state: Option<StateHandle>,
    last_charge: f64,
}

impl Capacitor {
    pub fn from_entity(e: &Entity) -> DeviceResult<Self> {
        if e.nodes.len() != 2 {
            return Err(DeviceError::BadConnection {
                entity: e.name.clone(),
                reason: format!("capacitor needs 2 nodes, got {}", e.nodes.len()),
            });
        }
        let capacitance = e.params.get_or("c", 0.0);
        if capacitance < 0.0 {
            return Err(DeviceError::InvalidParameter {
                entity: e.name.clone(),
                reason: "capacitance must not be negative".to_string(),
            });
        }
        let ic = e.params.get_or("ic", 0.0);
        Ok(Self {
            name: e.name.clone(),
            positive_name: e.nodes[0].clone(),
            negative_name: e.nodes[1].clone(),
            positive: None,
            negative: None,
            capacitance,
            ic,
            stamp: NodePairStamp::uninitialized(),
            stamp_ac: NodePairStamp::uninitialized(),
            state: None,
            last_charge: 0.0,
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

    /// The state handle and last-committed charge, for LTE evaluation across
    /// every reactive device.
    pub(crate) fn state_for_lte(&self) -> Option<(StateHandle, f64)> {
        self.state.map(|h| (h, self.last_charge))
    }
}

impl Biasing for Capacitor {
    fn load_bias(&self, _matrix: &mut SparseMatrix<f64>, _state: &mut SimulationState) {
        // Open circuit at DC (§4.5): no conductance, no RHS contribution.
    }
}

impl Frequency for Capacitor {
    fn load_frequency(&self, matrix: &mut SparseMatrix<Complex>, _rhs: &mut [Complex], omega: f64) {
        let y = Complex::new(0.0, omega * self.capacitance);
        self.stamp_ac.stamp_conductance(matrix, y);
    }
}

impl Transient for Capacitor {
    fn load_transient(
        &mut self,
        matrix: &mut SparseMatrix<f64>,
        state: &mut SimulationState,
        method: &mut dyn IntegrationMethod,
    ) {
        let handle = *self.state.get_or_insert_with(|| method.request_state());
        let v = state.voltage_diff(self.positive, self.negative);
        let q = self.capacitance * v;

        let result = method.integrate(handle, q);
        self.last_charge = q;

        let g = self.capacitance * result.ag0;
        let i_eq = result.derivative - g * v;

        self.stamp.stamp_conductance(matrix, g);
        stamp_rhs_current(&mut state.rhs, self.positive, self.negative, -i_eq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::ParameterSet;
    use crate::integration::Trapezoidal;

    #[test]
    fn capacitor_is_open_at_dc() {
        let e = Entity::new("C1", &["a", "0"], ParameterSet::new().with("c", 1e-6));
        let mut c = Capacitor::from_entity(&e).unwrap();
        let mut nodes = NodeMap::new();
        c.register_nodes(&mut nodes).unwrap();
        let mut m = SparseMatrix::<f64>::new(nodes.mna_matrix_dim());
        c.bind(&mut m).unwrap();
        m.fix_equations();
        let mut state = SimulationState::new(nodes.mna_matrix_dim(), 27.0);
        c.load_bias(&mut m, &mut state);
        assert_eq!(m.value_at(1, 1), 0.0);
        assert_eq!(state.rhs[1], 0.0);
    }

    #[test]
    fn capacitor_transient_stamp_matches_trapezoidal_conductance() {
        let e = Entity::new("C1", &["a", "0"], ParameterSet::new().with("c", 1e-6));
        let mut c = Capacitor::from_entity(&e).unwrap();
        let mut nodes = NodeMap::new();
        c.register_nodes(&mut nodes).unwrap();
        let mut m = SparseMatrix::<f64>::new(nodes.mna_matrix_dim());
        c.bind(&mut m).unwrap();
        m.fix_equations();

        let mut state = SimulationState::new(nodes.mna_matrix_dim(), 27.0);
        state.previous[1] = 1.0;

        let mut method = Trapezoidal::new();
        let delta = 1e-6;
        method.begin_step(delta, delta);

        c.load_transient(&mut m, &mut state, &mut method);

        let expected_g = 1e-6 * (2.0 / delta);
        assert!((m.value_at(1, 1) - expected_g).abs() / expected_g < 1e-9);
    }
}
