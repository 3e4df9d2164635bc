//! §4.5 + §6: orchestration gluing `Devices`/`NodeMap`/`SparseMatrix` into
//! the library's public entry points. Everything in §4.1-§4.4 is a reusable
//! mechanism; this module is the "~10% plumbing" that actually runs one.

mod ac;
mod dc;
mod op;
mod trans;

pub use ac::{simulate_ac, AcPoint};
pub use dc::{simulate_dc, DcPoint};
pub use op::simulate_op;
pub use trans::{simulate_trans, TransientPoint};

use std::collections::HashMap;

use crate::circuit::NodeMap;
use crate::devices::Devices;
use crate::error::SimulationResult;
use crate::solver::SparseMatrix;

/// A circuit ready to simulate: a device catalog bound to a fixed real
/// matrix, plus the node map every result is reported against. Built once
/// per §3 "Setup"; dropping it is the `Unsetup` (matrix pointers and
/// breakpoint registrations are ordinary owned data, released by `Drop`
/// rather than an explicit scope-guard type).
#[derive(Debug)]
pub struct Circuit {
    pub(crate) devices: Devices,
    pub(crate) nodes: NodeMap,
    pub(crate) matrix: SparseMatrix<f64>,
    /// Voltage-source/CCVS branch currents addressable by entity name, for
    /// `GetCurrent` (§6 "property exports").
    pub(crate) branch_by_name: HashMap<String, usize>,
}

impl Circuit {
    /// §3 "Setup": interns nodes, resolves controlled-source branch
    /// references, binds every device's matrix pointers, then fixes the
    /// matrix so no further element can be created.
    pub fn build(mut devices: Devices) -> SimulationResult<Self> {
        let mut nodes = NodeMap::new();
        let mut branch_by_name = HashMap::new();
        devices.register_nodes(&mut nodes, &mut branch_by_name)?;
        devices.resolve_controlling_branches(&branch_by_name)?;

        let mut matrix = SparseMatrix::<f64>::new(nodes.mna_matrix_dim());
        devices.bind_real(&mut matrix)?;
        matrix.fix_equations();

        Ok(Self {
            devices,
            nodes,
            matrix,
            branch_by_name,
        })
    }

    /// Looks up a node's solved voltage by name; `None` for an unknown
    /// name, `Some(0.0)` for ground.
    pub fn node_voltage(&self, name: &str, solution: &[f64]) -> Option<f64> {
        self.nodes.node_index(name).map(|idx| {
            if idx == crate::circuit::GROUND {
                0.0
            } else {
                solution[idx]
            }
        })
    }

    /// Looks up a named branch's solved current (voltage sources and CCVS
    /// only — the only devices that carry a branch unknown).
    pub fn branch_current(&self, name: &str, solution: &[f64]) -> Option<f64> {
        self.branch_by_name.get(name).map(|&idx| solution[idx])
    }

    /// Raw MNA index for a node name, scalar-type-independent (used by
    /// [`crate::events::SimulationEvent`], which is generic over `Scalar`).
    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.nodes.node_index(name)
    }

    /// Raw MNA index for a named branch unknown.
    pub fn branch_index(&self, name: &str) -> Option<usize> {
        self.branch_by_name.get(name).copied()
    }

    /// Matrix order (solution vectors are `matrix_order() + 1` long, index 0
    /// unused).
    pub fn matrix_order(&self) -> usize {
        self.nodes.mna_matrix_dim()
    }

    /// Every interned node name, in MNA index order (ground excluded).
    pub fn node_names(&self) -> &[String] {
        self.nodes.node_names_mna_order()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Entity, ParameterSet};

    #[test]
    fn build_fixes_the_matrix_and_interns_nodes() {
        let mut devices = Devices::new();
        devices
            .add_voltage_source(&Entity::new("V1", &["in", "0"], ParameterSet::new().with("dc", 1.0)))
            .unwrap();
        let circuit = Circuit::build(devices).unwrap();
        assert!(circuit.nodes.node_index("in").is_some());
    }
}
