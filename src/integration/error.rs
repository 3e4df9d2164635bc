use thiserror::Error;

use crate::newton::NewtonError;

/// §7 transient-layer failures: a Newton failure at a point, or the driver
/// halving the step below what the simulation can make progress with.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IntegrationError {
    #[error("timestep collapsed to {attempted:e} (floor {floor:e}) at t={time:e}")]
    TimestepTooSmall {
        time: f64,
        attempted: f64,
        floor: f64,
    },

    #[error(transparent)]
    Newton(#[from] NewtonError),
}

pub type IntegrationResult<T> = Result<T, IntegrationError>;
