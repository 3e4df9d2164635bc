use thiserror::Error;

use crate::solver::SolverError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NewtonError {
    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error("no convergence after {iterations} iterations (max residual {max_residual:e})")]
    NoConvergence {
        iterations: usize,
        max_residual: f64,
    },
}

pub type NewtonResult<T> = Result<T, NewtonError>;
