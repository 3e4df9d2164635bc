//! §7 "Rust error taxonomy": the top-level failure type every public
//! `simulate_*` entry point returns, layered over the lower error kinds the
//! same way the teacher engine layers its own `SimulationError` over
//! `SolverError` — a thin `#[error(transparent)]` wrapper per layer plus
//! whatever setup-phase variants belong only at this level.

use thiserror::Error;

use crate::devices::DeviceError;
use crate::integration::IntegrationError;
use crate::newton::NewtonError;
use crate::solver::SolverError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Newton(#[from] NewtonError),

    #[error(transparent)]
    Integration(#[from] IntegrationError),

    #[error("no independent source named '{name}' to sweep")]
    UnknownSweepSource { name: String },
}

pub type SimulationResult<T> = Result<T, SimulationError>;
