//! §4.5 "DC sweep (expansion)": re-runs the operating-point solve at each
//! value of one designated independent source, threading the previous
//! point's converged solution in as the next point's initial guess —
//! standard SPICE continuation, and the reason [`SimulationState`] is
//! reused across iterations here instead of rebuilt per point.

use crate::config::ConvergenceConfig;
use crate::error::{SimulationError, SimulationResult};
use crate::newton::{self, NewtonTopology};
use crate::state::SimulationState;

use super::Circuit;

/// One converged point of a DC sweep.
#[derive(Debug, Clone)]
pub struct DcPoint {
    pub sweep_value: f64,
    pub solution: Vec<f64>,
}

/// Sweeps the independent source named `source_name` through `values` in
/// order, solving the operating point at each and carrying the converged
/// solution forward as the next point's starting guess.
pub fn simulate_dc(
    circuit: &mut Circuit,
    source_name: &str,
    values: &[f64],
    convergence: &ConvergenceConfig,
) -> SimulationResult<Vec<DcPoint>> {
    let mut state = SimulationState::new(circuit.nodes.mna_matrix_dim(), 27.0);
    let topology = NewtonTopology {
        node_count: circuit.nodes.nodes_len(),
    };
    let mut points = Vec::with_capacity(values.len());

    for &value in values {
        if !circuit.devices.set_dc_override(source_name, value) {
            return Err(SimulationError::UnknownSweepSource {
                name: source_name.to_string(),
            });
        }

        let matrix = &mut circuit.matrix;
        let devices = &circuit.devices;
        newton::solve(matrix, &mut state, convergence, topology, convergence.itl1, |m, s| {
            devices.load_bias(m, s);
        })?;

        points.push(DcPoint {
            sweep_value: value,
            solution: state.previous.clone(),
        });
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Entity, ParameterSet};
    use crate::devices::Devices;

    #[test]
    fn sweep_tracks_the_divider_ratio() {
        let mut devices = Devices::new();
        devices
            .add_voltage_source(&Entity::new("V1", &["in", "0"], ParameterSet::new().with("dc", 0.0)))
            .unwrap();
        devices
            .add_resistor(&Entity::new("R1", &["in", "out"], ParameterSet::new().with("r", 1000.0)))
            .unwrap();
        devices
            .add_resistor(&Entity::new("R2", &["out", "0"], ParameterSet::new().with("r", 1000.0)))
            .unwrap();

        let mut circuit = Circuit::build(devices).unwrap();
        let values = [0.0, 2.0, 4.0];
        let points = simulate_dc(&mut circuit, "V1", &values, &ConvergenceConfig::default()).unwrap();

        for (point, &v) in points.iter().zip(values.iter()) {
            let out = circuit.node_voltage("out", &point.solution).unwrap();
            assert!((out - v / 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn unknown_sweep_source_is_an_error() {
        let devices = Devices::new();
        let mut circuit = Circuit::build(devices).unwrap();
        let err = simulate_dc(&mut circuit, "V1", &[0.0], &ConvergenceConfig::default()).unwrap_err();
        assert!(matches!(err, SimulationError::UnknownSweepSource { .. }));
    }
}
