//! §4.2 Newton Driver: stamp -> factor -> solve -> converge, with the three
//! convergence aids tried in order on failure (voltage limiting lives inside
//! device models; this module owns gmin stepping and source stepping).
//!
//! Grounded on the from-scratch Newton-over-MNA loop in
//! `other_examples/ceb7bd0b_petereon-pedaler_core__src-solver-newton.rs.rs`
//! (clear -> stamp -> factor -> solve -> max-component-diff convergence),
//! generalized to this crate's sparse matrix and homotopy fallbacks.

mod error;

pub use error::{NewtonError, NewtonResult};

use log::{debug, trace, warn};

use crate::config::ConvergenceConfig;
use crate::solver::SparseMatrix;
use crate::state::SimulationState;

/// What the Newton driver needs to know about the circuit beyond the matrix
/// itself: how many rows are node-KCL equations. Gmin stepping only touches
/// those, never branch/KVL rows; the convergence test also uses this split
/// to pick `vntol` vs `abstol` as a row's tolerance floor.
#[derive(Debug, Clone, Copy)]
pub struct NewtonTopology {
    pub node_count: usize,
}

/// Runs plain Newton iteration (§4.2 steps 1-6) at the current `state.gmin`/
/// `state.source_factor`, calling `load` once per iteration to re-stamp the
/// matrix and RHS from `state.previous`.
fn iterate(
    matrix: &mut SparseMatrix<f64>,
    state: &mut SimulationState,
    convergence: &ConvergenceConfig,
    topology: NewtonTopology,
    max_iterations: usize,
    mut load: impl FnMut(&mut SparseMatrix<f64>, &mut SimulationState),
) -> NewtonResult<()> {
    let order = state.previous.len() - 1;
    let mut x_next = vec![0.0; order + 1];
    let mut last_residual = f64::INFINITY;

    for iteration in 0..max_iterations {
        matrix.clear_values();
        state.clear_rhs();
        load(matrix, state);
        stamp_gmin(matrix, state.gmin, topology);

        if iteration == 0 {
            matrix.order_and_factor()?;
        } else if !matrix.factor() {
            matrix.order_and_factor()?;
        }
        x_next.copy_from_slice(&matrix.solve(&state.rhs)?);

        let mut max_residual: f64 = 0.0;
        let mut converged = true;
        // §4.2 step 5: node voltages (rows 1..=node_count) and branch
        // currents (the remaining rows) are not dimensionally comparable,
        // so each gets its own tolerance floor — `vntol` for voltages,
        // `abstol` alone for currents.
        for i in 1..=order {
            let diff = (x_next[i] - state.previous[i]).abs();
            let tol = if i <= topology.node_count {
                convergence.reltol * x_next[i].abs().max(state.previous[i].abs()) + convergence.vntol
            } else {
                convergence.reltol * x_next[i].abs().max(state.previous[i].abs()) + convergence.abstol
            };
            max_residual = max_residual.max(diff);
            if diff > tol {
                converged = false;
            }
        }
        trace!("newton iteration {iteration}: max residual {max_residual:e}");
        last_residual = max_residual;
        state.previous.copy_from_slice(&x_next);

        if converged {
            debug!("newton converged after {} iterations", iteration + 1);
            return Ok(());
        }
    }

    Err(NewtonError::NoConvergence {
        iterations: max_iterations,
        max_residual: last_residual,
    })
}

fn stamp_gmin(matrix: &mut SparseMatrix<f64>, gmin: f64, topology: NewtonTopology) {
    if gmin <= 0.0 {
        return;
    }
    for node in 1..=topology.node_count {
        if let Some(h) = matrix.get_diagonal_element(node) {
            matrix.stamp(h, gmin);
        }
    }
}

/// Runs Newton with the full convergence-aid ladder: plain Newton, then gmin
/// stepping, then source stepping. `state.gmin`/`state.source_factor` are
/// restored to their settled values (`0.0`/`1.0`) on success.
pub fn solve(
    matrix: &mut SparseMatrix<f64>,
    state: &mut SimulationState,
    convergence: &ConvergenceConfig,
    topology: NewtonTopology,
    max_iterations: usize,
    mut load: impl FnMut(&mut SparseMatrix<f64>, &mut SimulationState),
) -> NewtonResult<()> {
    let baseline = state.previous.clone();

    if iterate(matrix, state, convergence, topology, max_iterations, &mut load).is_ok() {
        return Ok(());
    }

    state.previous.copy_from_slice(&baseline);
    if gmin_stepping(matrix, state, convergence, topology, max_iterations, &mut load).is_ok() {
        state.gmin = 0.0;
        return Ok(());
    }

    state.previous.copy_from_slice(&baseline);
    state.gmin = 0.0;
    source_stepping(matrix, state, convergence, topology, max_iterations, &mut load)
}

fn gmin_stepping(
    matrix: &mut SparseMatrix<f64>,
    state: &mut SimulationState,
    convergence: &ConvergenceConfig,
    topology: NewtonTopology,
    max_iterations: usize,
    mut load: impl FnMut(&mut SparseMatrix<f64>, &mut SimulationState),
) -> NewtonResult<()> {
    let mut gmin = 1.0;
    let floor = convergence.gmin;
    warn!("newton did not converge directly, engaging gmin stepping from {gmin:e}");

    loop {
        state.gmin = gmin;
        match iterate(matrix, state, convergence, topology, max_iterations, &mut load) {
            Ok(()) => {
                if gmin <= floor {
                    return Ok(());
                }
                gmin *= 0.1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn source_stepping(
    matrix: &mut SparseMatrix<f64>,
    state: &mut SimulationState,
    convergence: &ConvergenceConfig,
    topology: NewtonTopology,
    max_iterations: usize,
    mut load: impl FnMut(&mut SparseMatrix<f64>, &mut SimulationState),
) -> NewtonResult<()> {
    warn!("gmin stepping did not converge, engaging source stepping");
    let mut alpha: f64 = 0.0;
    let mut step = 0.1;

    while alpha < 1.0 {
        let attempt = (alpha + step).min(1.0);
        state.source_factor = attempt;
        match iterate(matrix, state, convergence, topology, max_iterations, &mut load) {
            Ok(()) => {
                alpha = attempt;
                step = (step * 2.0).min(0.2);
            }
            Err(e) => {
                step *= 0.5;
                if step < 1e-4 {
                    return Err(e);
                }
            }
        }
    }

    state.source_factor = 1.0;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Entity, NodeMap, ParameterSet};
    use crate::devices::Devices;

    #[test]
    fn resistor_divider_converges_in_one_newton_iteration() {
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

        let mut nodes = NodeMap::new();
        let mut branch_by_name = std::collections::HashMap::new();
        devices.register_nodes(&mut nodes, &mut branch_by_name).unwrap();
        devices.resolve_controlling_branches(&branch_by_name).unwrap();

        let mut matrix = SparseMatrix::<f64>::new(nodes.mna_matrix_dim());
        devices.bind_real(&mut matrix).unwrap();
        matrix.fix_equations();

        let mut state = SimulationState::new(nodes.mna_matrix_dim(), 27.0);
        let convergence = ConvergenceConfig::default();
        let topology = NewtonTopology {
            node_count: nodes.nodes_len(),
        };

        solve(&mut matrix, &mut state, &convergence, topology, convergence.itl1, |m, s| {
            devices.load_bias(m, s);
        })
        .unwrap();

        let out = nodes.node_index("out").unwrap();
        assert!((state.previous[out] - 5.0).abs() < 1e-6);
    }
}
