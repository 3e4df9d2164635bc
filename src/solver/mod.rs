mod element;
mod error;
mod markowitz;
mod matrix;

pub use element::ElementHandle;
pub use error::{SolverError, SolverResult};
pub use matrix::SparseMatrix;
