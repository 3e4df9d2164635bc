//! §4.4 Step loop: the 8-step transient algorithm gluing the Newton driver,
//! an [`IntegrationMethod`], and the [`BreakpointTable`] together.

use log::{debug, warn};

use crate::config::{ConvergenceConfig, TransientConfig};
use crate::devices::Devices;
use crate::newton::{self, NewtonTopology};
use crate::solver::SparseMatrix;
use crate::state::SimulationState;

use super::breakpoint::{BreakpointTable, DELTA_MIN_FACTOR};
use super::error::{IntegrationError, IntegrationResult};
use super::method::IntegrationMethod;

const MAX_STEP_HALVINGS: usize = 10;

/// One accepted transient point, handed to the caller's observer.
#[derive(Debug, Clone, Copy)]
pub struct AcceptedPoint {
    pub time: f64,
}

/// Drives a transient analysis from `config.init` to `config.stop`, calling
/// `on_accept` once per accepted point.
#[allow(clippy::too_many_arguments)]
pub fn run(
    devices: &mut Devices,
    matrix: &mut SparseMatrix<f64>,
    state: &mut SimulationState,
    convergence: &ConvergenceConfig,
    config: &TransientConfig,
    topology: NewtonTopology,
    method: &mut dyn IntegrationMethod,
    breakpoints: &mut BreakpointTable,
    mut on_accept: impl FnMut(AcceptedPoint, &[f64]),
) -> IntegrationResult<()> {
    let max_step = config.effective_maxstep();
    let delta_min = DELTA_MIN_FACTOR * max_step;

    devices.register_breakpoints(breakpoints, config.init, delta_min, config.stop);

    let mut t = config.init;
    let mut proposed = config.step.min(max_step);
    let mut consecutive_accepts = 0usize;

    state.time = t;
    on_accept(AcceptedPoint { time: t }, &state.previous);

    while t < config.stop {
        let mut delta_try = proposed.min(max_step);
        let mut halvings = 0usize;
        let mut on_breakpoint = false;

        loop {
            if let Some(bp) = breakpoints.next() {
                if t + delta_try >= bp {
                    delta_try = bp - t;
                    on_breakpoint = true;
                }
            }
            if delta_try < delta_min {
                return Err(IntegrationError::TimestepTooSmall {
                    time: t,
                    attempted: delta_try,
                    floor: delta_min,
                });
            }

            let t_try = t + delta_try;
            breakpoints.begin_step();
            if on_breakpoint {
                method.force_order_one();
            }
            method.begin_step(t_try, delta_try);
            state.time = t_try;

            let newton_result = newton::solve(
                matrix,
                state,
                convergence,
                topology,
                convergence.itl4,
                |m, s| {
                    devices.load_bias(m, s);
                    devices.load_transient_reactive(m, s, method);
                },
            );

            if newton_result.is_err() {
                warn!("transient newton failed to converge at t={t_try:e}, halving step");
                breakpoints.rollback_step();
                method.reject_step();
                halvings += 1;
                if halvings > MAX_STEP_HALVINGS {
                    return Err(IntegrationError::Newton(newton_result.unwrap_err()));
                }
                delta_try *= 0.5;
                on_breakpoint = false;
                continue;
            }

            let tau = lte_of(devices, method, config.trtol, config.chgtol);

            if tau > 1.0 {
                debug!("step rejected at t={t_try:e}, tau={tau:.3}");
                breakpoints.rollback_step();
                method.reject_step();
                let order = method.order() as f64;
                delta_try *= (0.9 * tau.powf(-1.0 / (order + 1.0))).clamp(0.1, 0.9);
                consecutive_accepts = 0;
                on_breakpoint = false;
                continue;
            }

            method.commit_step();
            breakpoints.commit_step();
            t = t_try;
            if on_breakpoint {
                breakpoints.pop_through(t, delta_min);
            }
            debug!("step accepted at t={t:e}, order={}", method.order());
            on_accept(AcceptedPoint { time: t }, &state.previous);

            let order = method.order() as f64;
            let grown = (0.9 * delta_try * tau.max(1e-9).powf(-1.0 / (order + 1.0))).max(delta_try);
            proposed = (2.0 * delta_try).min(grown).min(max_step);

            consecutive_accepts += 1;
            if on_breakpoint {
                method.force_order_one();
            } else if consecutive_accepts >= 3 {
                method.raise_order();
            }
            break;
        }
    }

    Ok(())
}

fn lte_of(devices: &Devices, method: &dyn IntegrationMethod, trtol: f64, chgtol: f64) -> f64 {
    devices.reactive_state_handles().iter().fold(0.0_f64, |acc, &(handle, value)| {
        acc.max(method.lte(handle, value, trtol, chgtol))
    })
}
