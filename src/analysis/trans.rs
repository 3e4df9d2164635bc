//! §4.4 transient: wires the [`integration::driver::run`] step loop to a
//! built [`Circuit`], selecting the configured integration method and
//! collecting every accepted point into an owned result the caller can
//! inspect without the driver's borrow lifetime.

use crate::config::{ConvergenceConfig, IntegrationMethodKind, TransientConfig};
use crate::error::SimulationResult;
use crate::integration::{self, BreakpointTable, Gear, IntegrationMethod, Trapezoidal};
use crate::newton::NewtonTopology;
use crate::state::{AnalysisPhase, SimulationState};

use super::Circuit;

/// One accepted transient point: the time it landed on and the full
/// solution vector (1-based, index 0 unused) at that time.
#[derive(Debug, Clone)]
pub struct TransientPoint {
    pub time: f64,
    pub solution: Vec<f64>,
}

const DEFAULT_GEAR_MAX_ORDER: usize = 6;

/// Runs a transient analysis from `config.init` to `config.stop`, returning
/// every accepted point in order. If `config.useic` is set, node voltages
/// already present in `initial_conditions` are used as the starting point
/// instead of running an operating-point solve first (§4.5).
pub fn simulate_trans(
    circuit: &mut Circuit,
    convergence: &ConvergenceConfig,
    config: &TransientConfig,
    initial_conditions: &[(usize, f64)],
) -> SimulationResult<Vec<TransientPoint>> {
    let mut state = SimulationState::new(circuit.nodes.mna_matrix_dim(), 27.0);
    state.phase = AnalysisPhase::Transient;
    state.use_initial_conditions = config.useic;
    if config.useic {
        for &(node, value) in initial_conditions {
            state.previous[node] = value;
        }
    }

    let topology = NewtonTopology {
        node_count: circuit.nodes.nodes_len(),
    };

    let mut method: Box<dyn IntegrationMethod> = match config.method {
        IntegrationMethodKind::Trapezoidal => Box::new(Trapezoidal::new()),
        IntegrationMethodKind::Gear => Box::new(Gear::new(DEFAULT_GEAR_MAX_ORDER)),
    };
    let mut breakpoints = BreakpointTable::new();

    let mut points = Vec::new();
    let matrix = &mut circuit.matrix;
    let devices = &mut circuit.devices;
    integration::run(
        devices,
        matrix,
        &mut state,
        convergence,
        config,
        topology,
        method.as_mut(),
        &mut breakpoints,
        |accepted, solution| {
            points.push(TransientPoint {
                time: accepted.time,
                solution: solution.to_vec(),
            });
        },
    )?;

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Entity, ParameterSet};
    use crate::devices::Devices;

    #[test]
    fn rc_constant_holds_the_dc_level() {
        let mut devices = Devices::new();
        devices
            .add_voltage_source(&Entity::new("V1", &["in", "0"], ParameterSet::new().with("dc", 10.0)))
            .unwrap();
        devices
            .add_resistor(&Entity::new("R1", &["in", "out"], ParameterSet::new().with("r", 10.0)))
            .unwrap();
        devices
            .add_capacitor(&Entity::new("C1", &["out", "0"], ParameterSet::new().with("c", 20.0)))
            .unwrap();

        let mut circuit = Circuit::build(devices).unwrap();
        let convergence = ConvergenceConfig::default();
        super::super::simulate_op(&mut circuit, &convergence).unwrap();

        let config = TransientConfig::new(0.0, 10.0, 1.0);
        let points = simulate_trans(&mut circuit, &convergence, &config, &[]).unwrap();

        let out = circuit.nodes.node_index("out").unwrap();
        for point in &points {
            assert!((point.solution[out] - 10.0).abs() < 1e-6);
        }
    }

    /// §8 scenario 5: a PULSE source's corner times (0, td+tr, td+tr+pw, ...)
    /// must be hit exactly by the accepted-point sequence, within `DeltaMin`.
    #[test]
    fn pulse_breakpoints_are_hit_exactly() {
        let mut devices = Devices::new();
        devices
            .add_voltage_source(&Entity::new(
                "V1",
                &["in", "0"],
                ParameterSet::new()
                    .with("v1", 0.0)
                    .with("v2", 5.0)
                    .with("td", 0.0)
                    .with("tr", 1e-9)
                    .with("tf", 1e-9)
                    .with("pw", 5e-9)
                    .with("per", 10e-9),
            ))
            .unwrap();
        devices
            .add_resistor(&Entity::new("R1", &["in", "out"], ParameterSet::new().with("r", 1000.0)))
            .unwrap();
        devices
            .add_capacitor(&Entity::new("C1", &["out", "0"], ParameterSet::new().with("c", 1e-9)))
            .unwrap();

        let mut circuit = Circuit::build(devices).unwrap();
        let convergence = ConvergenceConfig::default();
        let config = TransientConfig::new(0.0, 50e-9, 0.5e-9);
        let points = simulate_trans(&mut circuit, &convergence, &config, &[]).unwrap();

        let max_step = config.effective_maxstep();
        let delta_min = 1e-13 * max_step;
        let times: Vec<f64> = points.iter().map(|p| p.time).collect();

        for t in times.windows(2) {
            assert!(t[1] > t[0], "accepted times must be strictly increasing");
        }

        let expected_corners = [0.0, 1e-9, 6e-9, 7e-9, 10e-9, 11e-9, 16e-9, 17e-9];
        for &corner in &expected_corners {
            let hit = times.iter().any(|&t| (t - corner).abs() <= delta_min * 2.0);
            assert!(hit, "breakpoint {corner:e} was not hit exactly; times were {times:?}");
        }
    }
}
