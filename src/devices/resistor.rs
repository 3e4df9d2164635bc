//! §4.3 resistor: the simplest biasing + frequency behavior, a fixed
//! conductance stamped identically in the real and complex instantiations.

use super::stamp::NodePairStamp;
use super::{Biasing, DeviceError, DeviceResult, Frequency};
use crate::circuit::{Entity, NodeMap};
use crate::scalar::{Complex, Scalar};
use crate::solver::SparseMatrix;
use crate::state::SimulationState;
use crate::util::node_ref;

#[derive(Debug, Clone)]
pub struct Resistor {
    pub name: String,
    positive_name: String,
    negative_name: String,
    positive: Option<usize>,
    negative: Option<usize>,
    /// Resistance (Ohms).
    pub resistance: f64,
    /// Optional AC override value (Ohms); defaults to `resistance`.
    pub ac_resistance: f64,
    stamp: NodePairStamp,
    stamp_ac: NodePairStamp,
}

impl Resistor {
    pub fn from_entity(e: &Entity) -> DeviceResult<Self> {
        if e.nodes.len() != 2 {
            return Err(DeviceError::BadConnection {
                entity: e.name.clone(),
                reason: format!("resistor needs 2 nodes, got {}", e.nodes.len()),
            });
        }
        let resistance = e.params.get_or("r", 1e-3);
        if resistance == 0.0 {
            return Err(DeviceError::InvalidParameter {
                entity: e.name.clone(),
                reason: "resistance must be non-zero".to_string(),
            });
        }
        let ac_resistance = e.params.get("ac").unwrap_or(resistance);
        Ok(Self {
            name: e.name.clone(),
            positive_name: e.nodes[0].clone(),
            negative_name: e.nodes[1].clone(),
            positive: None,
            negative: None,
            resistance,
            ac_resistance,
            stamp: NodePairStamp::uninitialized(),
            stamp_ac: NodePairStamp::uninitialized(),
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
}

impl Biasing for Resistor {
    fn load_bias(&self, matrix: &mut SparseMatrix<f64>, _state: &mut SimulationState) {
        self.stamp.stamp_conductance(matrix, 1.0 / self.resistance);
    }
}

impl Frequency for Resistor {
    fn load_frequency(&self, matrix: &mut SparseMatrix<Complex>, _rhs: &mut [Complex], _omega: f64) {
        self.stamp_ac
            .stamp_conductance(matrix, Complex::from_real(1.0 / self.ac_resistance));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::ParameterSet;

    #[test]
    fn resistor_divider_bias_stamp() {
        let e = Entity::new("R1", &["in", "out"], ParameterSet::new().with("r", 1000.0));
        let mut r = Resistor::from_entity(&e).unwrap();
        let mut nodes = NodeMap::new();
        r.register_nodes(&mut nodes).unwrap();
        let mut m = SparseMatrix::<f64>::new(nodes.mna_matrix_dim());
        r.bind(&mut m).unwrap();
        m.fix_equations();
        let mut state = SimulationState::new(nodes.mna_matrix_dim(), 27.0);
        r.load_bias(&mut m, &mut state);
        assert_eq!(m.value_at(1, 1), 1e-3);
        assert_eq!(m.value_at(2, 2), 1e-3);
        assert_eq!(m.value_at(1, 2), -1e-3);
    }

    #[test]
    fn zero_resistance_is_invalid() {
        let e = Entity::new("R1", &["in", "out"], ParameterSet::new().with("r", 0.0));
        assert!(Resistor::from_entity(&e).is_err());
    }
}
