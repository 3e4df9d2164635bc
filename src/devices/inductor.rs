//! §4.3 inductor: a short circuit at DC (its own branch current, KVL row with
//! zero RHS), a companion conductance via the same [`IntegrationMethod`]
//! protocol as the capacitor in transient, and a pure reactance at AC.
//!
//! Grounded on the teacher's `stamp_dc` (unit incidence, zero RHS on the
//! branch row); the branch row's own constitutive equation is
//! `v_pos - v_neg - L*di/dt = 0`, so with `stamp_incidence` putting `+1`/`-1`
//! on the branch row's `v_pos`/`v_neg` columns, the `i` coefficient (AC:
//! `-j*omega*L`, transient: `-g`) and RHS (transient: `+i_eq`) both carry a
//! leading minus to match. The transient companion stamp is new, built from
//! the flux `phi = L*i` the same way the capacitor turns charge into a
//! conductance + equivalent source.

use super::stamp::NodeBranchStamp;
use super::{Biasing, DeviceError, DeviceResult, Frequency, Transient};
use crate::circuit::{Entity, NodeMap};
use crate::integration::{IntegrationMethod, StateHandle};
use crate::scalar::{Complex, Scalar};
use crate::solver::SparseMatrix;
use crate::state::SimulationState;
use crate::util::node_ref;

#[derive(Debug, Clone)]
pub struct Inductor {
    pub name: String,
    positive_name: String,
    negative_name: String,
    positive: Option<usize>,
    negative: Option<usize>,
    branch: usize,
    /// Inductance (Henries).
    pub inductance: f64,
    /// Initial condition current, used when `state.use_initial_conditions`.
    pub ic: f64,
    stamp: NodeBranchStamp,
    stamp_ac: NodeBranchStamp,
    state: Option<StateHandle>,
    last_flux: f64,
}

impl Inductor {
    pub fn from_entity(e: &Entity) -> DeviceResult<Self> {
        if e.nodes.len() != 2 {
            return Err(DeviceError::BadConnection {
                entity: e.name.clone(),
                reason: format!("inductor needs 2 nodes, got {}", e.nodes.len()),
            });
        }
        let inductance = e.params.get_or("l", 0.0);
        if inductance < 0.0 {
            return Err(DeviceError::InvalidParameter {
                entity: e.name.clone(),
                reason: "inductance must not be negative".to_string(),
            });
        }
        let ic = e.params.get_or("ic", 0.0);
        Ok(Self {
            name: e.name.clone(),
            positive_name: e.nodes[0].clone(),
            negative_name: e.nodes[1].clone(),
            positive: None,
            negative: None,
            branch: 0,
            inductance,
            ic,
            stamp: NodeBranchStamp::uninitialized(),
            stamp_ac: NodeBranchStamp::uninitialized(),
            state: None,
            last_flux: 0.0,
        })
    }

    pub(crate) fn register_nodes(&mut self, nodes: &mut NodeMap) -> DeviceResult<()> {
        self.positive = node_ref(nodes.insert_node(&self.positive_name));
        self.negative = node_ref(nodes.insert_node(&self.negative_name));
        self.branch = nodes.insert_branch();
        Ok(())
    }

    pub(crate) fn bind(&mut self, matrix: &mut SparseMatrix<f64>) -> DeviceResult<()> {
        self.stamp = NodeBranchStamp::bind(matrix, self.positive, self.negative, self.branch, true)?;
        Ok(())
    }

    pub(crate) fn bind_ac(&mut self, matrix: &mut SparseMatrix<Complex>) -> DeviceResult<()> {
        self.stamp_ac = NodeBranchStamp::bind(matrix, self.positive, self.negative, self.branch, true)?;
        Ok(())
    }

    pub(crate) fn state_for_lte(&self) -> Option<(StateHandle, f64)> {
        self.state.map(|h| (h, self.last_flux))
    }
}

impl Biasing for Inductor {
    /// Short circuit: unit incidence on its own KVL row, zero RHS.
    fn load_bias(&self, matrix: &mut SparseMatrix<f64>, _state: &mut SimulationState) {
        self.stamp.stamp_incidence(matrix);
    }
}

impl Frequency for Inductor {
    fn load_frequency(&self, matrix: &mut SparseMatrix<Complex>, _rhs: &mut [Complex], omega: f64) {
        self.stamp_ac.stamp_incidence(matrix);
        self.stamp_ac
            .stamp_branch_diagonal(matrix, Complex::new(0.0, -omega * self.inductance));
    }
}

impl Transient for Inductor {
    fn load_transient(
        &mut self,
        matrix: &mut SparseMatrix<f64>,
        state: &mut SimulationState,
        method: &mut dyn IntegrationMethod,
    ) {
        let handle = *self.state.get_or_insert_with(|| method.request_state());
        let branch = self.branch;
        let i = state.previous[branch];
        let phi = self.inductance * i;

        let result = method.integrate(handle, phi);
        self.last_flux = phi;

        let g = self.inductance * result.ag0;
        let i_eq = result.derivative - g * i;

        self.stamp.stamp_incidence(matrix);
        self.stamp.stamp_branch_diagonal(matrix, -g);
        state.rhs[branch] += i_eq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::ParameterSet;
    use crate::integration::Trapezoidal;

    #[test]
    fn inductor_is_a_short_at_dc() {
        let e = Entity::new("L1", &["a", "0"], ParameterSet::new().with("l", 1e-3));
        let mut l = Inductor::from_entity(&e).unwrap();
        let mut nodes = NodeMap::new();
        l.register_nodes(&mut nodes).unwrap();
        let mut m = SparseMatrix::<f64>::new(nodes.mna_matrix_dim());
        l.bind(&mut m).unwrap();
        m.fix_equations();
        let mut state = SimulationState::new(nodes.mna_matrix_dim(), 27.0);
        l.load_bias(&mut m, &mut state);
        assert_eq!(m.value_at(1, l.branch), 1.0);
        assert_eq!(m.value_at(l.branch, 1), 1.0);
    }

    #[test]
    fn inductor_transient_branch_diagonal_matches_trapezoidal_ag0() {
        let e = Entity::new("L1", &["a", "0"], ParameterSet::new().with("l", 1e-3));
        let mut l = Inductor::from_entity(&e).unwrap();
        let mut nodes = NodeMap::new();
        l.register_nodes(&mut nodes).unwrap();
        let mut m = SparseMatrix::<f64>::new(nodes.mna_matrix_dim());
        l.bind(&mut m).unwrap();
        m.fix_equations();

        let mut state = SimulationState::new(nodes.mna_matrix_dim(), 27.0);
        state.previous[l.branch] = 0.5;

        let mut method = Trapezoidal::new();
        let delta = 1e-6;
        method.begin_step(delta, delta);

        l.load_transient(&mut m, &mut state, &mut method);

        let expected = -1e-3 * (2.0 / delta);
        assert!((m.value_at(l.branch, l.branch) - expected).abs() / expected.abs() < 1e-9);
    }
}
