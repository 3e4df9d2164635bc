//! §4.5 "Operating point": plain Newton (§4.2) with capacitors open and
//! inductors shorted, which falls out automatically since neither device's
//! `Biasing` contributes anything — `Transient` is never invoked here.

use crate::config::ConvergenceConfig;
use crate::error::SimulationResult;
use crate::newton::{self, NewtonTopology};
use crate::state::SimulationState;

use super::Circuit;

/// Solves for the DC operating point, returning the converged solution
/// vector (1-based, index 0 unused) in MNA order.
pub fn simulate_op(circuit: &mut Circuit, convergence: &ConvergenceConfig) -> SimulationResult<Vec<f64>> {
    let mut state = SimulationState::new(circuit.nodes.mna_matrix_dim(), 27.0);
    let topology = NewtonTopology {
        node_count: circuit.nodes.nodes_len(),
    };

    let matrix = &mut circuit.matrix;
    let devices = &circuit.devices;
    newton::solve(matrix, &mut state, convergence, topology, convergence.itl1, |m, s| {
        devices.load_bias(m, s);
    })?;

    Ok(state.previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Entity, ParameterSet};
    use crate::devices::Devices;

    #[test]
    fn resistor_divider_op_point() {
        let mut devices = Devices::new();
        devices
            .add_voltage_source(&Entity::new("V1", &["in", "0"], ParameterSet::new().with("dc", 10.0)))
            .unwrap();
        devices
            .add_resistor(&Entity::new("R1", &["in", "out"], ParameterSet::new().with("r", 1000.0)))
            .unwrap();
        devices
            .add_resistor(&Entity::new("R2", &["out", "0"], ParameterSet::new().with("r", 1000.0)))
            .unwrap();

        let mut circuit = Circuit::build(devices).unwrap();
        let solution = simulate_op(&mut circuit, &ConvergenceConfig::default()).unwrap();
        let out = circuit.node_voltage("out", &solution).unwrap();
        assert!((out - 5.0).abs() < 1e-9);
    }

    /// §8 scenario 6: two ideal voltage sources in parallel with different
    /// values leave no consistent branch current, so the bias matrix is
    /// structurally singular — `OrderAndFactor` must report it, not hang or
    /// silently produce a wrong answer.
    #[test]
    fn parallel_voltage_sources_are_singular() {
        use crate::error::SimulationError;
        use crate::solver::SolverError;

        let mut devices = Devices::new();
        devices
            .add_voltage_source(&Entity::new("V1", &["a", "0"], ParameterSet::new().with("dc", 5.0)))
            .unwrap();
        devices
            .add_voltage_source(&Entity::new("V2", &["a", "0"], ParameterSet::new().with("dc", 3.0)))
            .unwrap();

        let mut circuit = Circuit::build(devices).unwrap();
        let err = simulate_op(&mut circuit, &ConvergenceConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            SimulationError::Newton(crate::newton::NewtonError::Solver(SolverError::SingularMatrix { .. }))
        ));
    }

    /// §8 scenario 4: a diode forward-biased to 0.7 V by an ideal source
    /// draws `Is * (exp(Vd / Vt) - 1)` out of that source, within 5%.
    #[test]
    fn diode_forward_bias_matches_shockley_current() {
        let mut devices = Devices::new();
        devices
            .add_voltage_source(&Entity::new("V1", &["a", "0"], ParameterSet::new().with("dc", 0.7)))
            .unwrap();
        devices
            .add_diode(&Entity::new("D1", &["a", "0"], ParameterSet::new().with("is", 1e-14)))
            .unwrap();

        let mut circuit = Circuit::build(devices).unwrap();
        let solution = simulate_op(&mut circuit, &ConvergenceConfig::default()).unwrap();

        let expected = 1e-14 * ((0.7 / 0.02585f64).exp() - 1.0);
        let i_v1 = -circuit.branch_current("V1", &solution).unwrap();
        assert!(
            (i_v1 - expected).abs() / expected < 0.05,
            "expected ~{expected:e}, got {i_v1:e}"
        );
    }
}
