//! §4.3 the four controlled source kinds (VCVS/VCCS/CCVS/CCCS). All four are
//! linear in this catalog — no junction physics, no state — so `Load` only
//! ever writes the same fixed coefficients every iteration; there is no
//! `last_*` bias point to track the way the diode/BJT junctions need.
//!
//! Grounded on `rjwalters-spicier`'s `spicier-devices::controlled` module
//! (the only controlled-source implementation in the pack outside the
//! teacher, which ships none): same four device shapes and the same
//! branch-current-coupling idiom for the two that own a KVL row (VCVS,
//! CCVS), rebuilt on this crate's [`crate::solver::SparseMatrix`]/
//! [`super::stamp`] cached-handle binding instead of a dense `MnaSystem`.

use super::stamp::NodeBranchStamp;
use super::{Biasing, DeviceError, DeviceResult, Frequency};
use crate::circuit::{Entity, NodeMap};
use crate::scalar::{Complex, Scalar};
use crate::solver::{ElementHandle, SparseMatrix};
use crate::state::SimulationState;
use crate::util::node_ref;
use std::collections::HashMap;

fn require_ctrl_name<'a>(e: &'a Entity, param: &str) -> DeviceResult<&'a str> {
    e.params.get_str(param).ok_or_else(|| DeviceError::InvalidParameter {
        entity: e.name.clone(),
        reason: format!("missing controlling source name (`{param}`)"),
    })
}

fn resolve_branch(
    entity_name: &str,
    ctrl_name: &str,
    branch_by_name: &HashMap<String, usize>,
) -> DeviceResult<usize> {
    branch_by_name.get(ctrl_name).copied().ok_or_else(|| DeviceError::BadConnection {
        entity: entity_name.to_string(),
        reason: format!("controlling source '{ctrl_name}' not found (or has no branch current)"),
    })
}

/// VCVS (E element): `V(out+,out-) = gain * V(ctrl+,ctrl-)`, its own branch
/// current unknown like an independent voltage source.
#[derive(Debug, Clone)]
pub struct Vcvs {
    pub name: String,
    out_pos_name: String,
    out_neg_name: String,
    ctrl_pos_name: String,
    ctrl_neg_name: String,
    out_pos: Option<usize>,
    out_neg: Option<usize>,
    ctrl_pos: Option<usize>,
    ctrl_neg: Option<usize>,
    branch: usize,
    pub gain: f64,
    stamp: NodeBranchStamp,
    stamp_ac: NodeBranchStamp,
    ctrl_pos_handle: Option<ElementHandle>,
    ctrl_neg_handle: Option<ElementHandle>,
    ctrl_pos_handle_ac: Option<ElementHandle>,
    ctrl_neg_handle_ac: Option<ElementHandle>,
}

impl Vcvs {
    pub fn from_entity(e: &Entity) -> DeviceResult<Self> {
        if e.nodes.len() != 4 {
            return Err(DeviceError::BadConnection {
                entity: e.name.clone(),
                reason: format!("vcvs needs 4 nodes (out+ out- ctrl+ ctrl-), got {}", e.nodes.len()),
            });
        }
        Ok(Self {
            name: e.name.clone(),
            out_pos_name: e.nodes[0].clone(),
            out_neg_name: e.nodes[1].clone(),
            ctrl_pos_name: e.nodes[2].clone(),
            ctrl_neg_name: e.nodes[3].clone(),
            out_pos: None,
            out_neg: None,
            ctrl_pos: None,
            ctrl_neg: None,
            branch: 0,
            gain: e.params.get_or("gain", 1.0),
            stamp: NodeBranchStamp::uninitialized(),
            stamp_ac: NodeBranchStamp::uninitialized(),
            ctrl_pos_handle: None,
            ctrl_neg_handle: None,
            ctrl_pos_handle_ac: None,
            ctrl_neg_handle_ac: None,
        })
    }

    pub(crate) fn register_nodes(&mut self, nodes: &mut NodeMap) -> DeviceResult<()> {
        self.out_pos = node_ref(nodes.insert_node(&self.out_pos_name));
        self.out_neg = node_ref(nodes.insert_node(&self.out_neg_name));
        self.ctrl_pos = node_ref(nodes.insert_node(&self.ctrl_pos_name));
        self.ctrl_neg = node_ref(nodes.insert_node(&self.ctrl_neg_name));
        self.branch = nodes.insert_branch();
        Ok(())
    }

    pub(crate) fn bind(&mut self, matrix: &mut SparseMatrix<f64>) -> DeviceResult<()> {
        self.stamp = NodeBranchStamp::bind(matrix, self.out_pos, self.out_neg, self.branch, false)?;
        self.ctrl_pos_handle = self.ctrl_pos.map(|c| matrix.get_element(self.branch, c)).transpose()?;
        self.ctrl_neg_handle = self.ctrl_neg.map(|c| matrix.get_element(self.branch, c)).transpose()?;
        Ok(())
    }

    pub(crate) fn bind_ac(&mut self, matrix: &mut SparseMatrix<Complex>) -> DeviceResult<()> {
        self.stamp_ac = NodeBranchStamp::bind(matrix, self.out_pos, self.out_neg, self.branch, false)?;
        self.ctrl_pos_handle_ac = self.ctrl_pos.map(|c| matrix.get_element(self.branch, c)).transpose()?;
        self.ctrl_neg_handle_ac = self.ctrl_neg.map(|c| matrix.get_element(self.branch, c)).transpose()?;
        Ok(())
    }
}

impl Biasing for Vcvs {
    fn load_bias(&self, matrix: &mut SparseMatrix<f64>, _state: &mut SimulationState) {
        self.stamp.stamp_incidence(matrix);
        if let Some(h) = self.ctrl_pos_handle {
            matrix.set(h, -self.gain);
        }
        if let Some(h) = self.ctrl_neg_handle {
            matrix.set(h, self.gain);
        }
    }
}

impl Frequency for Vcvs {
    fn load_frequency(&self, matrix: &mut SparseMatrix<Complex>, _rhs: &mut [Complex], _omega: f64) {
        self.stamp_ac.stamp_incidence(matrix);
        if let Some(h) = self.ctrl_pos_handle_ac {
            matrix.set(h, Complex::from_real(-self.gain));
        }
        if let Some(h) = self.ctrl_neg_handle_ac {
            matrix.set(h, Complex::from_real(self.gain));
        }
    }
}

/// VCCS (G element): `I(out+ -> out-) = gm * V(ctrl+,ctrl-)`. No branch
/// current of its own: a pure four-terminal transconductance stamp.
#[derive(Debug, Clone)]
pub struct Vccs {
    pub name: String,
    out_pos_name: String,
    out_neg_name: String,
    ctrl_pos_name: String,
    ctrl_neg_name: String,
    out_pos: Option<usize>,
    out_neg: Option<usize>,
    ctrl_pos: Option<usize>,
    ctrl_neg: Option<usize>,
    pub gm: f64,
    handles: [Option<ElementHandle>; 4],
    handles_ac: [Option<ElementHandle>; 4],
}

impl Vccs {
    pub fn from_entity(e: &Entity) -> DeviceResult<Self> {
        if e.nodes.len() != 4 {
            return Err(DeviceError::BadConnection {
                entity: e.name.clone(),
                reason: format!("vccs needs 4 nodes (out+ out- ctrl+ ctrl-), got {}", e.nodes.len()),
            });
        }
        Ok(Self {
            name: e.name.clone(),
            out_pos_name: e.nodes[0].clone(),
            out_neg_name: e.nodes[1].clone(),
            ctrl_pos_name: e.nodes[2].clone(),
            ctrl_neg_name: e.nodes[3].clone(),
            out_pos: None,
            out_neg: None,
            ctrl_pos: None,
            ctrl_neg: None,
            gm: e.params.get_or("gm", 0.0),
            handles: [None; 4],
            handles_ac: [None; 4],
        })
    }

    pub(crate) fn register_nodes(&mut self, nodes: &mut NodeMap) -> DeviceResult<()> {
        self.out_pos = node_ref(nodes.insert_node(&self.out_pos_name));
        self.out_neg = node_ref(nodes.insert_node(&self.out_neg_name));
        self.ctrl_pos = node_ref(nodes.insert_node(&self.ctrl_pos_name));
        self.ctrl_neg = node_ref(nodes.insert_node(&self.ctrl_neg_name));
        Ok(())
    }

    fn bind_handles<F: Scalar>(&self, matrix: &mut SparseMatrix<F>) -> DeviceResult<[Option<ElementHandle>; 4]> {
        let at = |matrix: &mut SparseMatrix<F>, r: Option<usize>, c: Option<usize>| -> DeviceResult<Option<ElementHandle>> {
            match (r, c) {
                (Some(r), Some(c)) => Ok(Some(matrix.get_element(r, c)?)),
                _ => Ok(None),
            }
        };
        Ok([
            at(matrix, self.out_pos, self.ctrl_pos)?,
            at(matrix, self.out_pos, self.ctrl_neg)?,
            at(matrix, self.out_neg, self.ctrl_pos)?,
            at(matrix, self.out_neg, self.ctrl_neg)?,
        ])
    }

    pub(crate) fn bind(&mut self, matrix: &mut SparseMatrix<f64>) -> DeviceResult<()> {
        self.handles = self.bind_handles(matrix)?;
        Ok(())
    }

    pub(crate) fn bind_ac(&mut self, matrix: &mut SparseMatrix<Complex>) -> DeviceResult<()> {
        self.handles_ac = self.bind_handles(matrix)?;
        Ok(())
    }
}

impl Biasing for Vccs {
    fn load_bias(&self, matrix: &mut SparseMatrix<f64>, _state: &mut SimulationState) {
        let [op_cp, op_cn, on_cp, on_cn] = self.handles;
        if let Some(h) = op_cp {
            matrix.stamp(h, self.gm);
        }
        if let Some(h) = op_cn {
            matrix.stamp(h, -self.gm);
        }
        if let Some(h) = on_cp {
            matrix.stamp(h, -self.gm);
        }
        if let Some(h) = on_cn {
            matrix.stamp(h, self.gm);
        }
    }
}

impl Frequency for Vccs {
    fn load_frequency(&self, matrix: &mut SparseMatrix<Complex>, _rhs: &mut [Complex], _omega: f64) {
        let gm = Complex::from_real(self.gm);
        let [op_cp, op_cn, on_cp, on_cn] = self.handles_ac;
        if let Some(h) = op_cp {
            matrix.stamp(h, gm);
        }
        if let Some(h) = op_cn {
            matrix.stamp(h, -gm);
        }
        if let Some(h) = on_cp {
            matrix.stamp(h, -gm);
        }
        if let Some(h) = on_cn {
            matrix.stamp(h, gm);
        }
    }
}

/// CCCS (F element): `I(out+ -> out-) = gain * I(controlling voltage
/// source)`. References the controlling source's branch by name, resolved
/// once at setup (§4.3 Binding / the "cyclic behavior graph" design note).
#[derive(Debug, Clone)]
pub struct Cccs {
    pub name: String,
    out_pos_name: String,
    out_neg_name: String,
    ctrl_name: String,
    out_pos: Option<usize>,
    out_neg: Option<usize>,
    ctrl_branch: usize,
    pub gain: f64,
    out_pos_handle: Option<ElementHandle>,
    out_neg_handle: Option<ElementHandle>,
    out_pos_handle_ac: Option<ElementHandle>,
    out_neg_handle_ac: Option<ElementHandle>,
}

impl Cccs {
    pub fn from_entity(e: &Entity) -> DeviceResult<Self> {
        if e.nodes.len() != 2 {
            return Err(DeviceError::BadConnection {
                entity: e.name.clone(),
                reason: format!("cccs needs 2 nodes (out+ out-), got {}", e.nodes.len()),
            });
        }
        let ctrl_name = require_ctrl_name(e, "vname")?.to_string();
        Ok(Self {
            name: e.name.clone(),
            out_pos_name: e.nodes[0].clone(),
            out_neg_name: e.nodes[1].clone(),
            ctrl_name,
            out_pos: None,
            out_neg: None,
            ctrl_branch: 0,
            gain: e.params.get_or("gain", 1.0),
            out_pos_handle: None,
            out_neg_handle: None,
            out_pos_handle_ac: None,
            out_neg_handle_ac: None,
        })
    }

    pub(crate) fn register_nodes(&mut self, nodes: &mut NodeMap) -> DeviceResult<()> {
        self.out_pos = node_ref(nodes.insert_node(&self.out_pos_name));
        self.out_neg = node_ref(nodes.insert_node(&self.out_neg_name));
        Ok(())
    }

    pub(crate) fn resolve_controlling_branch(&mut self, branch_by_name: &HashMap<String, usize>) -> DeviceResult<()> {
        self.ctrl_branch = resolve_branch(&self.name, &self.ctrl_name, branch_by_name)?;
        Ok(())
    }

    pub(crate) fn bind(&mut self, matrix: &mut SparseMatrix<f64>) -> DeviceResult<()> {
        self.out_pos_handle = self.out_pos.map(|p| matrix.get_element(p, self.ctrl_branch)).transpose()?;
        self.out_neg_handle = self.out_neg.map(|n| matrix.get_element(n, self.ctrl_branch)).transpose()?;
        Ok(())
    }

    pub(crate) fn bind_ac(&mut self, matrix: &mut SparseMatrix<Complex>) -> DeviceResult<()> {
        self.out_pos_handle_ac = self.out_pos.map(|p| matrix.get_element(p, self.ctrl_branch)).transpose()?;
        self.out_neg_handle_ac = self.out_neg.map(|n| matrix.get_element(n, self.ctrl_branch)).transpose()?;
        Ok(())
    }
}

impl Biasing for Cccs {
    fn load_bias(&self, matrix: &mut SparseMatrix<f64>, _state: &mut SimulationState) {
        if let Some(h) = self.out_pos_handle {
            matrix.stamp(h, self.gain);
        }
        if let Some(h) = self.out_neg_handle {
            matrix.stamp(h, -self.gain);
        }
    }
}

impl Frequency for Cccs {
    fn load_frequency(&self, matrix: &mut SparseMatrix<Complex>, _rhs: &mut [Complex], _omega: f64) {
        let gain = Complex::from_real(self.gain);
        if let Some(h) = self.out_pos_handle_ac {
            matrix.stamp(h, gain);
        }
        if let Some(h) = self.out_neg_handle_ac {
            matrix.stamp(h, -gain);
        }
    }
}

/// CCVS (H element): `V(out+,out-) = gain * I(controlling voltage source)`,
/// its own branch current like VCVS, referencing the controlling source's
/// branch by name (resolved once at setup, same as CCCS).
#[derive(Debug, Clone)]
pub struct Ccvs {
    pub name: String,
    out_pos_name: String,
    out_neg_name: String,
    ctrl_name: String,
    out_pos: Option<usize>,
    out_neg: Option<usize>,
    branch: usize,
    ctrl_branch: usize,
    pub gain: f64,
    stamp: NodeBranchStamp,
    stamp_ac: NodeBranchStamp,
    ctrl_handle: Option<ElementHandle>,
    ctrl_handle_ac: Option<ElementHandle>,
}

impl Ccvs {
    pub fn from_entity(e: &Entity) -> DeviceResult<Self> {
        if e.nodes.len() != 2 {
            return Err(DeviceError::BadConnection {
                entity: e.name.clone(),
                reason: format!("ccvs needs 2 nodes (out+ out-), got {}", e.nodes.len()),
            });
        }
        let ctrl_name = require_ctrl_name(e, "vname")?.to_string();
        Ok(Self {
            name: e.name.clone(),
            out_pos_name: e.nodes[0].clone(),
            out_neg_name: e.nodes[1].clone(),
            ctrl_name,
            out_pos: None,
            out_neg: None,
            branch: 0,
            ctrl_branch: 0,
            gain: e.params.get_or("gain", 1.0),
            stamp: NodeBranchStamp::uninitialized(),
            stamp_ac: NodeBranchStamp::uninitialized(),
            ctrl_handle: None,
            ctrl_handle_ac: None,
        })
    }

    /// Returns this device's own branch index, for the caller to record in
    /// `branch_by_name` the same way an independent voltage source does
    /// (a CCVS output can itself control another CCCS/CCVS).
    pub(crate) fn register_nodes(&mut self, nodes: &mut NodeMap) -> DeviceResult<usize> {
        self.out_pos = node_ref(nodes.insert_node(&self.out_pos_name));
        self.out_neg = node_ref(nodes.insert_node(&self.out_neg_name));
        self.branch = nodes.insert_branch();
        Ok(self.branch)
    }

    pub(crate) fn resolve_controlling_branch(&mut self, branch_by_name: &HashMap<String, usize>) -> DeviceResult<()> {
        self.ctrl_branch = resolve_branch(&self.name, &self.ctrl_name, branch_by_name)?;
        Ok(())
    }

    pub(crate) fn bind(&mut self, matrix: &mut SparseMatrix<f64>) -> DeviceResult<()> {
        self.stamp = NodeBranchStamp::bind(matrix, self.out_pos, self.out_neg, self.branch, false)?;
        self.ctrl_handle = Some(matrix.get_element(self.branch, self.ctrl_branch)?);
        Ok(())
    }

    pub(crate) fn bind_ac(&mut self, matrix: &mut SparseMatrix<Complex>) -> DeviceResult<()> {
        self.stamp_ac = NodeBranchStamp::bind(matrix, self.out_pos, self.out_neg, self.branch, false)?;
        self.ctrl_handle_ac = Some(matrix.get_element(self.branch, self.ctrl_branch)?);
        Ok(())
    }
}

impl Biasing for Ccvs {
    fn load_bias(&self, matrix: &mut SparseMatrix<f64>, _state: &mut SimulationState) {
        self.stamp.stamp_incidence(matrix);
        if let Some(h) = self.ctrl_handle {
            matrix.set(h, -self.gain);
        }
    }
}

impl Frequency for Ccvs {
    fn load_frequency(&self, matrix: &mut SparseMatrix<Complex>, _rhs: &mut [Complex], _omega: f64) {
        self.stamp_ac.stamp_incidence(matrix);
        if let Some(h) = self.ctrl_handle_ac {
            matrix.set(h, Complex::from_real(-self.gain));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::ParameterSet;

    #[test]
    fn vcvs_couples_branch_row_to_control_nodes() {
        let e = Entity::new(
            "E1",
            &["out", "0", "ctrl", "0"],
            ParameterSet::new().with("gain", 2.0),
        );
        let mut v = Vcvs::from_entity(&e).unwrap();
        let mut nodes = NodeMap::new();
        v.register_nodes(&mut nodes).unwrap();
        let mut m = SparseMatrix::<f64>::new(nodes.mna_matrix_dim());
        v.bind(&mut m).unwrap();
        m.fix_equations();
        let mut state = SimulationState::new(nodes.mna_matrix_dim(), 27.0);
        v.load_bias(&mut m, &mut state);
        assert_eq!(m.value_at(v.branch, nodes.node_index("out").unwrap()), 1.0);
        assert_eq!(m.value_at(v.branch, nodes.node_index("ctrl").unwrap()), -2.0);
    }

    #[test]
    fn vccs_stamps_transconductance_block() {
        let e = Entity::new(
            "G1",
            &["out", "0", "ctrl", "0"],
            ParameterSet::new().with("gm", 0.01),
        );
        let mut g = Vccs::from_entity(&e).unwrap();
        let mut nodes = NodeMap::new();
        g.register_nodes(&mut nodes).unwrap();
        let mut m = SparseMatrix::<f64>::new(nodes.mna_matrix_dim());
        g.bind(&mut m).unwrap();
        m.fix_equations();
        let mut state = SimulationState::new(nodes.mna_matrix_dim(), 27.0);
        g.load_bias(&mut m, &mut state);
        let out = nodes.node_index("out").unwrap();
        let ctrl = nodes.node_index("ctrl").unwrap();
        assert_eq!(m.value_at(out, ctrl), 0.01);
    }

    #[test]
    fn cccs_requires_controlling_source_name() {
        let e = Entity::new("F1", &["out", "0"], ParameterSet::new().with("gain", 3.0));
        assert!(Cccs::from_entity(&e).is_err());
    }

    #[test]
    fn cccs_resolves_and_stamps_against_named_branch() {
        let e = Entity::new(
            "F1",
            &["out", "0"],
            ParameterSet::new().with("gain", 3.0).with_str("vname", "V1"),
        );
        let mut f = Cccs::from_entity(&e).unwrap();
        let mut nodes = NodeMap::new();
        f.register_nodes(&mut nodes).unwrap();
        let mut branch_by_name = HashMap::new();
        branch_by_name.insert("V1".to_string(), nodes.insert_branch());
        f.resolve_controlling_branch(&branch_by_name).unwrap();
        let mut m = SparseMatrix::<f64>::new(nodes.mna_matrix_dim());
        f.bind(&mut m).unwrap();
        m.fix_equations();
        let mut state = SimulationState::new(nodes.mna_matrix_dim(), 27.0);
        f.load_bias(&mut m, &mut state);
        assert_eq!(m.value_at(nodes.node_index("out").unwrap(), f.ctrl_branch), 3.0);
    }

    #[test]
    fn ccvs_unresolved_controlling_source_is_a_bad_connection() {
        let e = Entity::new(
            "H1",
            &["out", "0"],
            ParameterSet::new().with_str("vname", "missing"),
        );
        let mut h = Ccvs::from_entity(&e).unwrap();
        let mut nodes = NodeMap::new();
        h.register_nodes(&mut nodes).unwrap();
        let err = h.resolve_controlling_branch(&HashMap::new()).unwrap_err();
        assert!(matches!(err, DeviceError::BadConnection { .. }));
    }
}
