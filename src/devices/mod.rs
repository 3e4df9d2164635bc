//! §4.3 Device Behavior Protocol.
//!
//! A device is a polymorphic entity over the capability set {`Temperature`,
//! `Biasing`, `Frequency`, `Transient`}; each capability it implements is a
//! separate typed entry point. This catalog's dispatch is flat by
//! construction: [`Devices`] holds one concrete `Vec<T>` per device kind and
//! drives each through a statically-resolved trait method, never a `dyn`
//! vtable, per the "dynamic dispatch in hot loop" design note.

pub(crate) mod bjt;
pub(crate) mod capacitor;
pub(crate) mod controlled_sources;
pub(crate) mod diode;
pub(crate) mod inductor;
pub(crate) mod mosfet;
pub(crate) mod resistor;
pub(crate) mod sources;
pub(crate) mod stamp;

pub(crate) use bjt::Bjt;
pub(crate) use capacitor::Capacitor;
pub(crate) use controlled_sources::{Cccs, Ccvs, Vccs, Vcvs};
pub(crate) use diode::Diode;
pub(crate) use inductor::Inductor;
pub(crate) use mosfet::Mosfet;
pub(crate) use resistor::Resistor;
pub(crate) use sources::IndependentSource;

use std::collections::HashMap;
use thiserror::Error;

use crate::circuit::{Entity, NodeMap};
use crate::integration::{BreakpointTable, IntegrationMethod, StateHandle};
use crate::scalar::Complex;
use crate::solver::{SolverError, SparseMatrix};
use crate::state::SimulationState;

/// §7 device-layer failures: surfaced at setup, never at solve.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("entity '{entity}': invalid parameter: {reason}")]
    InvalidParameter { entity: String, reason: String },

    #[error("entity '{entity}': bad connection: {reason}")]
    BadConnection { entity: String, reason: String },

    #[error(transparent)]
    Solver(#[from] SolverError),
}

pub(crate) type DeviceResult<T> = Result<T, DeviceError>;

/// §4.2 step 2 / §4.5: contributes conductances and RHS currents at the
/// current bias point (`x_prev` in `state`). Takes `state` mutably solely so
/// a device can add its equivalent current directly into `state.rhs`;
/// devices only ever read `state.previous`/`state.gmin`/`state.source_factor`.
pub(crate) trait Biasing {
    fn load_bias(&self, matrix: &mut SparseMatrix<f64>, state: &mut SimulationState);
}

/// §4.5: contributes a small-signal admittance stamp (and, for sources, an
/// RHS phasor) around the converged operating point, in the native
/// `Complex` instantiation.
pub(crate) trait Frequency {
    fn load_frequency(&self, matrix: &mut SparseMatrix<Complex>, rhs: &mut [Complex], omega: f64);
}

/// §4.3 "Time-dependent devices": turns an instantaneous charge/flux into a
/// conductance + equivalent current via the active integration method.
pub(crate) trait Transient {
    fn load_transient(
        &mut self,
        matrix: &mut SparseMatrix<f64>,
        state: &mut SimulationState,
        method: &mut dyn IntegrationMethod,
    );
}

/// The circuit's device catalog: one typed vector per kind, grounded on the
/// teacher's `Devices` aggregate. Populated from [`Entity`] descriptors
/// (§3 Circuit Graph) rather than parsed netlist text.
#[derive(Debug, Clone, Default)]
pub struct Devices {
    pub(crate) resistors: Vec<Resistor>,
    pub(crate) capacitors: Vec<Capacitor>,
    pub(crate) inductors: Vec<Inductor>,
    pub(crate) diodes: Vec<Diode>,
    pub(crate) bjts: Vec<Bjt>,
    pub(crate) mosfets: Vec<Mosfet>,
    pub(crate) voltage_sources: Vec<IndependentSource>,
    pub(crate) current_sources: Vec<IndependentSource>,
    pub(crate) vcvs: Vec<Vcvs>,
    pub(crate) vccs: Vec<Vccs>,
    pub(crate) ccvs: Vec<Ccvs>,
    pub(crate) cccs: Vec<Cccs>,
}

impl Devices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resistor(&mut self, e: &Entity) -> DeviceResult<()> {
        self.resistors.push(Resistor::from_entity(e)?);
        Ok(())
    }

    pub fn add_capacitor(&mut self, e: &Entity) -> DeviceResult<()> {
        self.capacitors.push(Capacitor::from_entity(e)?);
        Ok(())
    }

    pub fn add_inductor(&mut self, e: &Entity) -> DeviceResult<()> {
        self.inductors.push(Inductor::from_entity(e)?);
        Ok(())
    }

    pub fn add_diode(&mut self, e: &Entity) -> DeviceResult<()> {
        self.diodes.push(Diode::from_entity(e)?);
        Ok(())
    }

    pub fn add_bjt(&mut self, e: &Entity) -> DeviceResult<()> {
        self.bjts.push(Bjt::from_entity(e)?);
        Ok(())
    }

    pub fn add_mosfet(&mut self, e: &Entity) -> DeviceResult<()> {
        self.mosfets.push(Mosfet::from_entity(e)?);
        Ok(())
    }

    pub fn add_voltage_source(&mut self, e: &Entity) -> DeviceResult<()> {
        self.voltage_sources.push(IndependentSource::from_entity(e, true)?);
        Ok(())
    }

    pub fn add_current_source(&mut self, e: &Entity) -> DeviceResult<()> {
        self.current_sources.push(IndependentSource::from_entity(e, false)?);
        Ok(())
    }

    pub fn add_vcvs(&mut self, e: &Entity) -> DeviceResult<()> {
        self.vcvs.push(Vcvs::from_entity(e)?);
        Ok(())
    }

    pub fn add_vccs(&mut self, e: &Entity) -> DeviceResult<()> {
        self.vccs.push(Vccs::from_entity(e)?);
        Ok(())
    }

    pub fn add_ccvs(&mut self, e: &Entity) -> DeviceResult<()> {
        self.ccvs.push(Ccvs::from_entity(e)?);
        Ok(())
    }

    pub fn add_cccs(&mut self, e: &Entity) -> DeviceResult<()> {
        self.cccs.push(Cccs::from_entity(e)?);
        Ok(())
    }

    /// §4.3 Binding, pass 1: interns every node name and allocates branch
    /// unknowns for devices that need one, recording each named branch
    /// (voltage sources, CCVS) in `branch_by_name` so CCVS/CCCS can resolve
    /// their controlling reference in pass 2.
    pub(crate) fn register_nodes(
        &mut self,
        nodes: &mut NodeMap,
        branch_by_name: &mut HashMap<String, usize>,
    ) -> DeviceResult<()> {
        for r in &mut self.resistors {
            r.register_nodes(nodes)?;
        }
        for c in &mut self.capacitors {
            c.register_nodes(nodes)?;
        }
        for l in &mut self.inductors {
            l.register_nodes(nodes)?;
        }
        for d in &mut self.diodes {
            d.register_nodes(nodes)?;
        }
        for q in &mut self.bjts {
            q.register_nodes(nodes)?;
        }
        for m in &mut self.mosfets {
            m.register_nodes(nodes)?;
        }
        for v in &mut self.voltage_sources {
            let branch = v.register_nodes(nodes, true)?;
            if let Some(branch) = branch {
                branch_by_name.insert(v.name.clone(), branch);
            }
        }
        for i in &mut self.current_sources {
            i.register_nodes(nodes, false)?;
        }
        for e in &mut self.vcvs {
            e.register_nodes(nodes)?;
        }
        for g in &mut self.vccs {
            g.register_nodes(nodes)?;
        }
        for h in &mut self.ccvs {
            let branch = h.register_nodes(nodes)?;
            branch_by_name.insert(h.name.clone(), branch);
        }
        for f in &mut self.cccs {
            f.register_nodes(nodes)?;
        }
        Ok(())
    }

    /// §4.3 Binding, pass 2: resolves CCVS/CCCS controlling-branch name
    /// references to raw indices now that every branch has been allocated.
    /// Per the "cyclic behavior graph" design note this runs once at setup,
    /// so the hot `Load` path only ever does an array lookup.
    pub(crate) fn resolve_controlling_branches(
        &mut self,
        branch_by_name: &HashMap<String, usize>,
    ) -> DeviceResult<()> {
        for h in &mut self.ccvs {
            h.resolve_controlling_branch(branch_by_name)?;
        }
        for f in &mut self.cccs {
            f.resolve_controlling_branch(branch_by_name)?;
        }
        Ok(())
    }

    pub(crate) fn bind_real(&mut self, matrix: &mut SparseMatrix<f64>) -> DeviceResult<()> {
        for r in &mut self.resistors {
            r.bind(matrix)?;
        }
        for c in &mut self.capacitors {
            c.bind(matrix)?;
        }
        for l in &mut self.inductors {
            l.bind(matrix)?;
        }
        for d in &mut self.diodes {
            d.bind(matrix)?;
        }
        for q in &mut self.bjts {
            q.bind(matrix)?;
        }
        for m in &mut self.mosfets {
            m.bind(matrix)?;
        }
        for v in &mut self.voltage_sources {
            v.bind_voltage(matrix)?;
        }
        for e in &mut self.vcvs {
            e.bind(matrix)?;
        }
        for g in &mut self.vccs {
            g.bind(matrix)?;
        }
        for h in &mut self.ccvs {
            h.bind(matrix)?;
        }
        for f in &mut self.cccs {
            f.bind(matrix)?;
        }
        Ok(())
    }

    pub(crate) fn bind_complex(&mut self, matrix: &mut SparseMatrix<Complex>) -> DeviceResult<()> {
        for r in &mut self.resistors {
            r.bind_ac(matrix)?;
        }
        for c in &mut self.capacitors {
            c.bind_ac(matrix)?;
        }
        for l in &mut self.inductors {
            l.bind_ac(matrix)?;
        }
        for d in &mut self.diodes {
            d.bind_ac(matrix)?;
        }
        for q in &mut self.bjts {
            q.bind_ac(matrix)?;
        }
        for m in &mut self.mosfets {
            m.bind_ac(matrix)?;
        }
        for v in &mut self.voltage_sources {
            v.bind_ac_voltage(matrix)?;
        }
        for e in &mut self.vcvs {
            e.bind_ac(matrix)?;
        }
        for g in &mut self.vccs {
            g.bind_ac(matrix)?;
        }
        for h in &mut self.ccvs {
            h.bind_ac(matrix)?;
        }
        for f in &mut self.cccs {
            f.bind_ac(matrix)?;
        }
        Ok(())
    }

    /// §4.2 step 2: `Load` over every biasing behavior.
    pub(crate) fn load_bias(&self, matrix: &mut SparseMatrix<f64>, state: &mut SimulationState) {
        for r in &self.resistors {
            r.load_bias(matrix, state);
        }
        for d in &self.diodes {
            d.load_bias(matrix, state);
        }
        for q in &self.bjts {
            q.load_bias(matrix, state);
        }
        for m in &self.mosfets {
            m.load_bias(matrix, state);
        }
        for v in &self.voltage_sources {
            v.load_bias(matrix, state);
        }
        for i in &self.current_sources {
            i.load_bias(matrix, state);
        }
        for e in &self.vcvs {
            e.load_bias(matrix, state);
        }
        for g in &self.vccs {
            g.load_bias(matrix, state);
        }
        for h in &self.ccvs {
            h.load_bias(matrix, state);
        }
        for f in &self.cccs {
            f.load_bias(matrix, state);
        }
    }

    /// §4.3 "Time-dependent devices": capacitors and inductors only, called
    /// in place of their (absent) `load_bias` whenever `state.phase` is
    /// `Transient`.
    pub(crate) fn load_transient_reactive(
        &mut self,
        matrix: &mut SparseMatrix<f64>,
        state: &mut SimulationState,
        method: &mut dyn IntegrationMethod,
    ) {
        for c in &mut self.capacitors {
            c.load_transient(matrix, state, method);
        }
        for l in &mut self.inductors {
            l.load_transient(matrix, state, method);
        }
    }

    pub(crate) fn load_frequency(&self, matrix: &mut SparseMatrix<Complex>, rhs: &mut [Complex], omega: f64) {
        for r in &self.resistors {
            r.load_frequency(matrix, rhs, omega);
        }
        for c in &self.capacitors {
            c.load_frequency(matrix, rhs, omega);
        }
        for l in &self.inductors {
            l.load_frequency(matrix, rhs, omega);
        }
        for d in &self.diodes {
            d.load_frequency(matrix, rhs, omega);
        }
        for q in &self.bjts {
            q.load_frequency(matrix, rhs, omega);
        }
        for m in &self.mosfets {
            m.load_frequency(matrix, rhs, omega);
        }
        for v in &self.voltage_sources {
            v.load_frequency(matrix, rhs, omega);
        }
        for i in &self.current_sources {
            i.load_frequency(matrix, rhs, omega);
        }
        for e in &self.vcvs {
            e.load_frequency(matrix, rhs, omega);
        }
        for g in &self.vccs {
            g.load_frequency(matrix, rhs, omega);
        }
        for h in &self.ccvs {
            h.load_frequency(matrix, rhs, omega);
        }
        for f in &self.cccs {
            f.load_frequency(matrix, rhs, omega);
        }
    }

    /// The `(state handle, last integrated value)` pair for every reactive
    /// device, used by the transient driver to compute per-state LTE.
    pub(crate) fn reactive_state_handles(&self) -> Vec<(StateHandle, f64)> {
        self.capacitors
            .iter()
            .filter_map(|c| c.state_for_lte())
            .chain(self.inductors.iter().filter_map(|l| l.state_for_lte()))
            .collect()
    }

    /// §4.5 "DC sweep expansion": overrides the named independent source's
    /// value for every subsequent `load_bias` call, until overridden again.
    /// Returns `false` if no source with that name exists.
    pub(crate) fn set_dc_override(&mut self, name: &str, value: f64) -> bool {
        for v in self.voltage_sources.iter_mut().chain(self.current_sources.iter_mut()) {
            if v.name == name {
                v.set_dc_override(Some(value));
                return true;
            }
        }
        false
    }

    /// Registers every pulse/sine independent source's upcoming edges with
    /// the breakpoint table (§4.3 "Independent source waveforms").
    pub(crate) fn register_breakpoints(&self, table: &mut BreakpointTable, now: f64, delta_min: f64, tstop: f64) {
        for v in self.voltage_sources.iter().chain(self.current_sources.iter()) {
            v.register_breakpoints(table, now, delta_min, tstop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::ParameterSet;

    #[test]
    fn devices_collect_by_kind() {
        let mut devices = Devices::new();
        devices
            .add_resistor(&Entity::new(
                "R1",
                &["in", "out"],
                ParameterSet::new().with("r", 1000.0),
            ))
            .unwrap();
        assert_eq!(devices.resistors.len(), 1);
    }
}
