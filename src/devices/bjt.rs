//! §4.3 BJT: Ebers-Moll (the injection model Gummel-Poon extends), base and
//! collector junctions linearized independently and combined via the
//! alpha-gain terminal-current relations, same derivation as the teacher's
//! `linearize`/`stamp_nonlinear`. Junction voltage limiting is new, reusing
//! the diode's previous-iterate logarithmic limiter per junction.

use std::cell::Cell;

use super::stamp::NodeTripletStamp;
use super::{Biasing, DeviceError, DeviceResult, Frequency};
use crate::circuit::{Entity, NodeMap};
use crate::scalar::{Complex, Scalar};
use crate::solver::SparseMatrix;
use crate::state::SimulationState;
use crate::util::get_voltage_diff;

const DEFAULT_THERMAL_VOLTAGE: f64 = 0.02585;
const DEFAULT_EXP_LIMIT: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Npn,
    Pnp,
}

#[derive(Debug, Clone, Copy, Default)]
struct LinearizedBjt {
    g_bb: f64,
    g_bc: f64,
    g_be: f64,
    g_cb: f64,
    g_cc: f64,
    g_ce: f64,
    g_eb: f64,
    g_ec: f64,
    g_ee: f64,
    i_eq_b: f64,
    i_eq_c: f64,
    i_eq_e: f64,
}

#[derive(Debug, Clone)]
pub struct Bjt {
    pub name: String,
    base_name: String,
    collector_name: String,
    emitter_name: String,
    base: Option<usize>,
    collector: Option<usize>,
    emitter: Option<usize>,
    pub polarity: Polarity,
    /// Saturation current (A).
    pub saturation_current: f64,
    /// Forward beta; internally converted to `alpha_f = bf/(bf+1)`.
    pub beta_forward: f64,
    /// Reverse beta; internally converted to `alpha_r = br/(br+1)`.
    pub beta_reverse: f64,
    pub emission_coeff_forward: f64,
    pub emission_coeff_reverse: f64,
    pub thermal_voltage: f64,
    pub exp_limit: f64,
    stamp: NodeTripletStamp,
    stamp_ac: NodeTripletStamp,
    last_vbe: Cell<f64>,
    last_vbc: Cell<f64>,
    linearized: Cell<LinearizedBjt>,
}

impl Bjt {
    pub fn from_entity(e: &Entity) -> DeviceResult<Self> {
        if e.nodes.len() != 3 {
            return Err(DeviceError::BadConnection {
                entity: e.name.clone(),
                reason: format!("bjt needs 3 nodes (collector, base, emitter), got {}", e.nodes.len()),
            });
        }
        let saturation_current = e.params.get_or("is", 1e-14);
        if saturation_current <= 0.0 {
            return Err(DeviceError::InvalidParameter {
                entity: e.name.clone(),
                reason: "saturation current must be positive".to_string(),
            });
        }
        let polarity = if e.params.get_or("pnp", 0.0) != 0.0 {
            Polarity::Pnp
        } else {
            Polarity::Npn
        };
        Ok(Self {
            name: e.name.clone(),
            collector_name: e.nodes[0].clone(),
            base_name: e.nodes[1].clone(),
            emitter_name: e.nodes[2].clone(),
            base: None,
            collector: None,
            emitter: None,
            polarity,
            saturation_current,
            beta_forward: e.params.get_or("bf", 100.0),
            beta_reverse: e.params.get_or("br", 1.0),
            emission_coeff_forward: e.params.get_or("nf", 1.0),
            emission_coeff_reverse: e.params.get_or("nr", 1.0),
            thermal_voltage: DEFAULT_THERMAL_VOLTAGE,
            exp_limit: DEFAULT_EXP_LIMIT,
            stamp: NodeTripletStamp::uninitialized(),
            stamp_ac: NodeTripletStamp::uninitialized(),
            last_vbe: Cell::new(0.0),
            last_vbc: Cell::new(0.0),
            linearized: Cell::new(LinearizedBjt::default()),
        })
    }

    pub(crate) fn register_nodes(&mut self, nodes: &mut NodeMap) -> DeviceResult<()> {
        self.collector = crate::util::node_ref(nodes.insert_node(&self.collector_name));
        self.base = crate::util::node_ref(nodes.insert_node(&self.base_name));
        self.emitter = crate::util::node_ref(nodes.insert_node(&self.emitter_name));
        Ok(())
    }

    pub(crate) fn bind(&mut self, matrix: &mut SparseMatrix<f64>) -> DeviceResult<()> {
        self.stamp = NodeTripletStamp::bind(matrix, self.base, self.collector, self.emitter)?;
        Ok(())
    }

    pub(crate) fn bind_ac(&mut self, matrix: &mut SparseMatrix<Complex>) -> DeviceResult<()> {
        self.stamp_ac = NodeTripletStamp::bind(matrix, self.base, self.collector, self.emitter)?;
        Ok(())
    }

    fn polarity_sign(&self) -> f64 {
        match self.polarity {
            Polarity::Npn => 1.0,
            Polarity::Pnp => -1.0,
        }
    }

    /// Logarithmic previous-iterate voltage limiting, same scheme as the
    /// diode, applied per junction.
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

    fn junction_values(&self, v: f64, emission_coeff: f64, last: &Cell<f64>) -> (f64, f64, f64) {
        let nvt = emission_coeff * self.thermal_voltage;
        let limited = Self::limit_step(v, last.get(), self.thermal_voltage);
        let v_eff = limited.clamp(-self.exp_limit * nvt, self.exp_limit * nvt);
        last.set(v_eff);

        let x = v_eff / nvt;
        let exp_v = x.exp();
        let isat = self.saturation_current;
        let i = isat * x.exp_m1();
        let g = isat * exp_v / nvt;
        (i, g, v_eff)
    }

    fn linearize(&self, v_be_node: f64, v_bc_node: f64) -> LinearizedBjt {
        let polarity = self.polarity_sign();
        let v_be = polarity * v_be_node;
        let v_bc = polarity * v_bc_node;

        let (i_f, g_f, vbe_eff) = self.junction_values(v_be, self.emission_coeff_forward, &self.last_vbe);
        let (i_r, g_r, vbc_eff) = self.junction_values(v_bc, self.emission_coeff_reverse, &self.last_vbc);

        let vbe_eff_node = vbe_eff * polarity;
        let vbc_eff_node = vbc_eff * polarity;

        let alpha_f = self.beta_forward / (self.beta_forward + 1.0);
        let alpha_r = self.beta_reverse / (self.beta_reverse + 1.0);

        let i_c0 = alpha_f * i_f - i_r;
        let i_b0 = (1.0 - alpha_f) * i_f + (1.0 - alpha_r) * i_r;
        let i_e0 = -i_f + alpha_r * i_r;

        let i_c = polarity * i_c0;
        let i_e = polarity * i_e0;
        let i_b = polarity * i_b0;

        let g_c_be = alpha_f * g_f;
        let g_c_bc = -g_r;
        let g_b_be = (1.0 - alpha_f) * g_f;
        let g_b_bc = (1.0 - alpha_r) * g_r;
        let g_e_be = -g_f;
        let g_e_bc = alpha_r * g_r;

        let g_cb = g_c_be + g_c_bc;
        let g_cc = -g_c_bc;
        let g_ce = -g_c_be;

        let g_bb = g_b_be + g_b_bc;
        let g_bc = -g_b_bc;
        let g_be = -g_b_be;

        let g_eb = g_e_be + g_e_bc;
        let g_ec = -g_e_bc;
        let g_ee = -g_e_be;

        let i_eq_c = i_c - g_c_be * vbe_eff_node - g_c_bc * vbc_eff_node;
        let i_eq_b = i_b - g_b_be * vbe_eff_node - g_b_bc * vbc_eff_node;
        let i_eq_e = i_e - g_e_be * vbe_eff_node - g_e_bc * vbc_eff_node;

        LinearizedBjt {
            g_bb,
            g_bc,
            g_be,
            g_cb,
            g_cc,
            g_ce,
            g_eb,
            g_ec,
            g_ee,
            i_eq_b,
            i_eq_c,
            i_eq_e,
        }
    }
}

impl Biasing for Bjt {
    fn load_bias(&self, matrix: &mut SparseMatrix<f64>, state: &mut SimulationState) {
        let v_be = get_voltage_diff(&state.previous, self.base, self.emitter);
        let v_bc = get_voltage_diff(&state.previous, self.base, self.collector);
        let l = self.linearize(v_be, v_bc);
        self.linearized.set(l);

        self.stamp
            .stamp(matrix, l.g_bb, l.g_bc, l.g_be, l.g_cb, l.g_cc, l.g_ce, l.g_eb, l.g_ec, l.g_ee);

        if let Some(base) = self.base {
            state.rhs[base] -= l.i_eq_b;
        }
        if let Some(collector) = self.collector {
            state.rhs[collector] -= l.i_eq_c;
        }
        if let Some(emitter) = self.emitter {
            state.rhs[emitter] -= l.i_eq_e;
        }
    }
}

impl Frequency for Bjt {
    fn load_frequency(&self, matrix: &mut SparseMatrix<Complex>, _rhs: &mut [Complex], _omega: f64) {
        let l = self.linearized.get();
        let c = Complex::from_real;
        self.stamp_ac.stamp(
            matrix,
            c(l.g_bb),
            c(l.g_bc),
            c(l.g_be),
            c(l.g_cb),
            c(l.g_cc),
            c(l.g_ce),
            c(l.g_eb),
            c(l.g_ec),
            c(l.g_ee),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::ParameterSet;

    #[test]
    fn npn_active_region_has_positive_collector_conductance() {
        let e = Entity::new(
            "Q1",
            &["c", "b", "e"],
            ParameterSet::new().with("is", 1e-14).with("bf", 100.0),
        );
        let mut q = Bjt::from_entity(&e).unwrap();
        let mut nodes = NodeMap::new();
        q.register_nodes(&mut nodes).unwrap();
        let mut m = SparseMatrix::<f64>::new(nodes.mna_matrix_dim());
        q.bind(&mut m).unwrap();
        m.fix_equations();
        let mut state = SimulationState::new(nodes.mna_matrix_dim(), 27.0);
        state.previous[nodes.node_index("b").unwrap()] = 0.7;
        state.previous[nodes.node_index("c").unwrap()] = 5.0;
        q.load_bias(&mut m, &mut state);
        assert!(q.linearized.get().g_cb > 0.0);
    }

    #[test]
    fn three_node_requirement_is_enforced() {
        let e = Entity::new("Q1", &["c", "b"], ParameterSet::new());
        assert!(Bjt::from_entity(&e).is_err());
    }
}
