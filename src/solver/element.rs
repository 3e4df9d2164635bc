use crate::scalar::Scalar;
use num_traits::Zero;

/// A non-zero entry in the sparse matrix. Lives in [`super::matrix::SparseMatrix`]'s
/// element arena and is addressed by its arena index rather than a raw pointer.
#[derive(Clone, Debug)]
pub(crate) struct Element<F> {
    pub row: usize,
    pub col: usize,
    pub value: F,
    /// previous element in this row (smaller column)
    pub left: Option<usize>,
    /// next element in this row (larger column)
    pub right: Option<usize>,
    /// previous element in this column (smaller row)
    pub above: Option<usize>,
    /// next element in this column (larger row)
    pub below: Option<usize>,
}

impl<F: Scalar> Element<F> {
    pub fn new(row: usize, col: usize) -> Self {
        Self {
            row,
            col,
            value: F::zero(),
            left: None,
            right: None,
            above: None,
            below: None,
        }
    }
}

/// Opaque handle to an [`Element`], cached by a device at setup time per the
/// binding protocol so that `Load` never re-resolves a matrix position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub(crate) usize);
