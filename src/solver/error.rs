use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    #[error("singular matrix: no acceptable pivot at step {step} (order {order})")]
    SingularMatrix { step: usize, order: usize },

    #[error("factor failed: zero pivot at step {step}, caller should re-order")]
    FactorFailed { step: usize },

    #[error("solve attempted before factorization")]
    NotFactored,

    #[error("matrix is frozen: cannot create new element at ({row}, {col})")]
    MatrixFrozen { row: usize, col: usize },

    #[error("row/column index {index} out of bounds (order {order})")]
    OutOfBounds { index: usize, order: usize },
}

pub type SolverResult<T> = Result<T, SolverError>;
