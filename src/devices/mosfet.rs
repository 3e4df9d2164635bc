//! §4.3 MOSFET: level-1 (Shichman-Hodges) square-law model, the one concrete
//! MOSFET this catalog ships (per the "JFET is deliberately not shipped"
//! resolution — one representative four-terminal nonlinear device is enough
//! to exercise [`super::stamp::NodeQuadStamp`]).
//!
//! No BSIM-family model here: the pack's only MOSFET precedent
//! (`rjwalters-spicier`'s BSIM4) is far beyond this catalog's scope. The
//! region equations and `gm`/`gds` partials below are the standard
//! textbook square-law derivation, linearized every Newton iteration the
//! same way the diode/BJT junctions are: `i_eq = Id(x_prev) - G*x_prev`,
//! stamped through the shared `stamp_rhs_current` sign convention. Body
//! effect and channel-length-modulation-in-triode cross terms are folded
//! into `lambda` uniformly rather than modeled separately; the bulk
//! terminal only participates in node registration/binding, not in the
//! current equation, so every bulk-column entry in the stamp is left zero.

use std::cell::Cell;

use super::stamp::NodeQuadStamp;
use super::{Biasing, DeviceError, DeviceResult, Frequency};
use crate::circuit::{Entity, NodeMap};
use crate::scalar::{Complex, Scalar};
use crate::solver::SparseMatrix;
use crate::state::SimulationState;
use crate::util::{node_ref, stamp_rhs_current};

const DRAIN: usize = 0;
const GATE: usize = 1;
const SOURCE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Nmos,
    Pmos,
}

#[derive(Debug, Clone, Copy, Default)]
struct LinearizedMosfet {
    gds: f64,
    gm: f64,
    gms: f64,
    i_eq: f64,
}

#[derive(Debug, Clone)]
pub struct Mosfet {
    pub name: String,
    drain_name: String,
    gate_name: String,
    source_name: String,
    bulk_name: String,
    drain: Option<usize>,
    gate: Option<usize>,
    source: Option<usize>,
    bulk: Option<usize>,
    pub polarity: Polarity,
    /// Threshold voltage (V).
    pub vto: f64,
    /// Transconductance parameter (A/V^2).
    pub kp: f64,
    /// Channel-length modulation (1/V).
    pub lambda: f64,
    pub width: f64,
    pub length: f64,
    stamp: NodeQuadStamp,
    stamp_ac: NodeQuadStamp,
    linearized: Cell<LinearizedMosfet>,
}

impl Mosfet {
    pub fn from_entity(e: &Entity) -> DeviceResult<Self> {
        if e.nodes.len() != 4 {
            return Err(DeviceError::BadConnection {
                entity: e.name.clone(),
                reason: format!("mosfet needs 4 nodes (drain, gate, source, bulk), got {}", e.nodes.len()),
            });
        }
        let width = e.params.get_or("w", 100e-6);
        let length = e.params.get_or("l", 100e-6);
        if width <= 0.0 || length <= 0.0 {
            return Err(DeviceError::InvalidParameter {
                entity: e.name.clone(),
                reason: "channel width and length must be positive".to_string(),
            });
        }
        let polarity = if e.params.get_or("pmos", 0.0) != 0.0 {
            Polarity::Pmos
        } else {
            Polarity::Nmos
        };
        Ok(Self {
            name: e.name.clone(),
            drain_name: e.nodes[0].clone(),
            gate_name: e.nodes[1].clone(),
            source_name: e.nodes[2].clone(),
            bulk_name: e.nodes[3].clone(),
            drain: None,
            gate: None,
            source: None,
            bulk: None,
            polarity,
            vto: e.params.get_or("vto", 1.0),
            kp: e.params.get_or("kp", 2.0e-5),
            lambda: e.params.get_or("lambda", 0.0),
            width,
            length,
            stamp: NodeQuadStamp::uninitialized(),
            stamp_ac: NodeQuadStamp::uninitialized(),
            linearized: Cell::new(LinearizedMosfet::default()),
        })
    }

    pub(crate) fn register_nodes(&mut self, nodes: &mut NodeMap) -> DeviceResult<()> {
        self.drain = node_ref(nodes.insert_node(&self.drain_name));
        self.gate = node_ref(nodes.insert_node(&self.gate_name));
        self.source = node_ref(nodes.insert_node(&self.source_name));
        self.bulk = node_ref(nodes.insert_node(&self.bulk_name));
        Ok(())
    }

    fn node_array(&self) -> [Option<usize>; 4] {
        [self.drain, self.gate, self.source, self.bulk]
    }

    pub(crate) fn bind(&mut self, matrix: &mut SparseMatrix<f64>) -> DeviceResult<()> {
        self.stamp = NodeQuadStamp::bind(matrix, self.node_array())?;
        Ok(())
    }

    pub(crate) fn bind_ac(&mut self, matrix: &mut SparseMatrix<Complex>) -> DeviceResult<()> {
        self.stamp_ac = NodeQuadStamp::bind(matrix, self.node_array())?;
        Ok(())
    }

    fn polarity_sign(&self) -> f64 {
        match self.polarity {
            Polarity::Nmos => 1.0,
            Polarity::Pmos => -1.0,
        }
    }

    /// Square-law drain current and its partials in the device's own
    /// (always-NMOS-shaped) `vgs`/`vds` frame.
    fn region_currents(&self, vgs: f64, vds: f64) -> (f64, f64, f64) {
        let beta = self.kp * self.width / self.length / 2.0;
        let vov = vgs - self.vto;
        if vov <= 0.0 {
            return (0.0, 0.0, 0.0);
        }
        if vds < vov {
            // Triode.
            let lam = 1.0 + self.lambda * vds;
            let id = beta * (2.0 * vov * vds - vds * vds) * lam;
            let gm = beta * 2.0 * vds * lam;
            let gds = beta * (2.0 * vov - 2.0 * vds) * lam + beta * (2.0 * vov * vds - vds * vds) * self.lambda;
            (id, gm, gds)
        } else {
            // Saturation.
            let lam = 1.0 + self.lambda * vds;
            let id = beta * vov * vov * lam;
            let gm = 2.0 * beta * vov * lam;
            let gds = beta * vov * vov * self.lambda;
            (id, gm, gds)
        }
    }

    fn linearize(&self, v_g: f64, v_d: f64, v_s: f64) -> LinearizedMosfet {
        let polarity = self.polarity_sign();
        let vgs = polarity * (v_g - v_s);
        let vds = polarity * (v_d - v_s);
        let (id, gm, gds) = self.region_currents(vgs, vds);

        // Chain rule through the polarity-flipped frame: d(I_ds)/dVg = gm,
        // d(I_ds)/dVd = gds, d(I_ds)/dVs = -(gm+gds), regardless of polarity.
        let i_ds = polarity * id;
        let gms = -(gm + gds);
        let i_eq = i_ds - gds * v_d - gm * v_g - gms * v_s;

        LinearizedMosfet { gds, gm, gms, i_eq }
    }
}

fn node_voltage(previous: &[f64], node: Option<usize>) -> f64 {
    node.map(|n| previous[n]).unwrap_or(0.0)
}

impl Biasing for Mosfet {
    fn load_bias(&self, matrix: &mut SparseMatrix<f64>, state: &mut SimulationState) {
        let v_g = node_voltage(&state.previous, self.gate);
        let v_d = node_voltage(&state.previous, self.drain);
        let v_s = node_voltage(&state.previous, self.source);
        let l = self.linearize(v_g, v_d, v_s);
        self.linearized.set(l);

        self.stamp.stamp(matrix, DRAIN, DRAIN, l.gds);
        self.stamp.stamp(matrix, DRAIN, GATE, l.gm);
        self.stamp.stamp(matrix, DRAIN, SOURCE, l.gms);
        self.stamp.stamp(matrix, SOURCE, DRAIN, -l.gds);
        self.stamp.stamp(matrix, SOURCE, GATE, -l.gm);
        self.stamp.stamp(matrix, SOURCE, SOURCE, -l.gms);

        stamp_rhs_current(&mut state.rhs, self.drain, self.source, -l.i_eq);
    }
}

impl Frequency for Mosfet {
    fn load_frequency(&self, matrix: &mut SparseMatrix<Complex>, _rhs: &mut [Complex], _omega: f64) {
        let l = self.linearized.get();
        let c = Complex::from_real;
        self.stamp_ac.stamp(matrix, DRAIN, DRAIN, c(l.gds));
        self.stamp_ac.stamp(matrix, DRAIN, GATE, c(l.gm));
        self.stamp_ac.stamp(matrix, DRAIN, SOURCE, c(l.gms));
        self.stamp_ac.stamp(matrix, SOURCE, DRAIN, c(-l.gds));
        self.stamp_ac.stamp(matrix, SOURCE, GATE, c(-l.gm));
        self.stamp_ac.stamp(matrix, SOURCE, SOURCE, c(-l.gms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::ParameterSet;

    fn build(polarity: f64) -> (Mosfet, NodeMap, SparseMatrix<f64>) {
        let e = Entity::new(
            "M1",
            &["d", "g", "s", "0"],
            ParameterSet::new().with("vto", 1.0).with("kp", 2e-5).with("pmos", polarity),
        );
        let mut m = Mosfet::from_entity(&e).unwrap();
        let mut nodes = NodeMap::new();
        m.register_nodes(&mut nodes).unwrap();
        let mut matrix = SparseMatrix::<f64>::new(nodes.mna_matrix_dim());
        m.bind(&mut matrix).unwrap();
        matrix.fix_equations();
        (m, nodes, matrix)
    }

    #[test]
    fn cutoff_has_zero_conductance() {
        let (m, nodes, mut matrix) = build(0.0);
        let mut state = SimulationState::new(nodes.mna_matrix_dim(), 27.0);
        state.previous[nodes.node_index("g").unwrap()] = 0.0;
        state.previous[nodes.node_index("d").unwrap()] = 5.0;
        m.load_bias(&mut matrix, &mut state);
        assert_eq!(m.linearized.get().gm, 0.0);
        assert_eq!(m.linearized.get().gds, 0.0);
    }

    #[test]
    fn saturation_has_positive_transconductance() {
        let (m, nodes, mut matrix) = build(0.0);
        let mut state = SimulationState::new(nodes.mna_matrix_dim(), 27.0);
        state.previous[nodes.node_index("g").unwrap()] = 3.0;
        state.previous[nodes.node_index("d").unwrap()] = 5.0;
        m.load_bias(&mut matrix, &mut state);
        assert!(m.linearized.get().gm > 0.0);
        assert_eq!(m.linearized.get().gds, 0.0);
    }

    #[test]
    fn four_node_requirement_is_enforced() {
        let e = Entity::new("M1", &["d", "g", "s"], ParameterSet::new());
        assert!(Mosfet::from_entity(&e).is_err());
    }
}
