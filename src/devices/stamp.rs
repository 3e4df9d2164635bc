//! §4.3 Binding: cached matrix pointers for the handful of stamp shapes every
//! device in this catalog needs. Generic over the scalar field so the same
//! cached-handle shape serves a device's bias/transient stamp (`F = f64`) and
//! its frequency stamp (`F = Complex`) — bound once each against the matrix
//! instantiation it belongs to.

use crate::scalar::Scalar;
use crate::solver::{ElementHandle, SolverResult, SparseMatrix};

/// Cached handles for a two-terminal device's conductance stamp: the two
/// diagonal entries and the two off-diagonal coupling entries. A `None` in
/// either terminal slot means that terminal is ground, which MNA never
/// stamps.
#[derive(Debug, Clone)]
pub(crate) struct NodePairStamp {
    pos_pos: Option<ElementHandle>,
    neg_neg: Option<ElementHandle>,
    pos_neg: Option<ElementHandle>,
    neg_pos: Option<ElementHandle>,
}

impl NodePairStamp {
    pub fn uninitialized() -> Self {
        Self {
            pos_pos: None,
            neg_neg: None,
            pos_neg: None,
            neg_pos: None,
        }
    }

    /// Acquires (and creates, if absent) every matrix position this stamp
    /// shape will ever write to. Called once per matrix instantiation
    /// (`f64` for bias/transient, `Complex` for frequency).
    pub fn bind<F: Scalar>(
        matrix: &mut SparseMatrix<F>,
        pos: Option<usize>,
        neg: Option<usize>,
    ) -> SolverResult<Self> {
        let pos_pos = pos.map(|p| matrix.get_element(p, p)).transpose()?;
        let neg_neg = neg.map(|n| matrix.get_element(n, n)).transpose()?;
        let (pos_neg, neg_pos) = match (pos, neg) {
            (Some(p), Some(n)) => (
                Some(matrix.get_element(p, n)?),
                Some(matrix.get_element(n, p)?),
            ),
            _ => (None, None),
        };
        Ok(Self {
            pos_pos,
            neg_neg,
            pos_neg,
            neg_pos,
        })
    }

    /// Adds the conductance `g` across the terminal pair (pos-pos/neg-neg
    /// positive, cross terms negative): the standard resistive stamp.
    pub fn stamp_conductance<F: Scalar>(&self, matrix: &mut SparseMatrix<F>, g: F) {
        if let Some(h) = self.pos_pos {
            matrix.stamp(h, g);
        }
        if let Some(h) = self.neg_neg {
            matrix.stamp(h, g);
        }
        if let Some(h) = self.pos_neg {
            matrix.stamp(h, -g);
        }
        if let Some(h) = self.neg_pos {
            matrix.stamp(h, -g);
        }
    }
}

/// Cached handles for the branch row/column a device with its own current
/// unknown contributes: the node/branch incidence entries (`B`/`Bᵀ`) plus,
/// optionally, a branch/branch diagonal entry (inductors and CCVS use this
/// for `-Z·i` on their own KVL row).
#[derive(Debug, Clone)]
pub(crate) struct NodeBranchStamp {
    pos_branch: Option<ElementHandle>,
    branch_pos: Option<ElementHandle>,
    neg_branch: Option<ElementHandle>,
    branch_neg: Option<ElementHandle>,
    branch_branch: Option<ElementHandle>,
}

impl NodeBranchStamp {
    pub fn uninitialized() -> Self {
        Self {
            pos_branch: None,
            branch_pos: None,
            neg_branch: None,
            branch_neg: None,
            branch_branch: None,
        }
    }

    pub fn bind<F: Scalar>(
        matrix: &mut SparseMatrix<F>,
        pos: Option<usize>,
        neg: Option<usize>,
        branch: usize,
        needs_branch_diag: bool,
    ) -> SolverResult<Self> {
        let (pos_branch, branch_pos) = match pos {
            Some(p) => (
                Some(matrix.get_element(p, branch)?),
                Some(matrix.get_element(branch, p)?),
            ),
            None => (None, None),
        };
        let (neg_branch, branch_neg) = match neg {
            Some(n) => (
                Some(matrix.get_element(n, branch)?),
                Some(matrix.get_element(branch, n)?),
            ),
            None => (None, None),
        };
        let branch_branch = needs_branch_diag
            .then(|| matrix.get_element(branch, branch))
            .transpose()?;
        Ok(Self {
            pos_branch,
            branch_pos,
            neg_branch,
            branch_neg,
            branch_branch,
        })
    }

    /// Stamps the unit incidence entries (`B`/`Bᵀ` = ±1): the shape shared by
    /// every branch-current-introducing device regardless of what sits on
    /// its own KVL row.
    pub fn stamp_incidence<F: Scalar>(&self, matrix: &mut SparseMatrix<F>) {
        let one = F::from_real(1.0);
        if let Some(h) = self.pos_branch {
            matrix.set(h, one);
        }
        if let Some(h) = self.branch_pos {
            matrix.set(h, one);
        }
        if let Some(h) = self.neg_branch {
            matrix.set(h, -one);
        }
        if let Some(h) = self.branch_neg {
            matrix.set(h, -one);
        }
    }

    pub fn stamp_branch_diagonal<F: Scalar>(&self, matrix: &mut SparseMatrix<F>, value: F) {
        if let Some(h) = self.branch_branch {
            matrix.set(h, value);
        }
    }
}

/// Cached handles for a three-terminal device's full 3x3 conductance block
/// (BJT base/collector/emitter). Reused verbatim for the AC instantiation.
#[derive(Debug, Clone)]
pub(crate) struct NodeTripletStamp {
    bb: Option<ElementHandle>,
    bc: Option<ElementHandle>,
    be: Option<ElementHandle>,
    cb: Option<ElementHandle>,
    cc: Option<ElementHandle>,
    ce: Option<ElementHandle>,
    eb: Option<ElementHandle>,
    ec: Option<ElementHandle>,
    ee: Option<ElementHandle>,
}

impl NodeTripletStamp {
    pub fn uninitialized() -> Self {
        Self {
            bb: None,
            bc: None,
            be: None,
            cb: None,
            cc: None,
            ce: None,
            eb: None,
            ec: None,
            ee: None,
        }
    }

    pub fn bind<F: Scalar>(
        matrix: &mut SparseMatrix<F>,
        base: Option<usize>,
        collector: Option<usize>,
        emitter: Option<usize>,
    ) -> SolverResult<Self> {
        fn at<F: Scalar>(
            matrix: &mut SparseMatrix<F>,
            r: Option<usize>,
            c: Option<usize>,
        ) -> SolverResult<Option<ElementHandle>> {
            match (r, c) {
                (Some(r), Some(c)) => matrix.get_element(r, c).map(Some),
                _ => Ok(None),
            }
        }
        Ok(Self {
            bb: at(matrix, base, base)?,
            bc: at(matrix, base, collector)?,
            be: at(matrix, base, emitter)?,
            cb: at(matrix, collector, base)?,
            cc: at(matrix, collector, collector)?,
            ce: at(matrix, collector, emitter)?,
            eb: at(matrix, emitter, base)?,
            ec: at(matrix, emitter, collector)?,
            ee: at(matrix, emitter, emitter)?,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn stamp<F: Scalar>(
        &self,
        matrix: &mut SparseMatrix<F>,
        g_bb: F,
        g_bc: F,
        g_be: F,
        g_cb: F,
        g_cc: F,
        g_ce: F,
        g_eb: F,
        g_ec: F,
        g_ee: F,
    ) {
        for (h, v) in [
            (self.bb, g_bb),
            (self.bc, g_bc),
            (self.be, g_be),
            (self.cb, g_cb),
            (self.cc, g_cc),
            (self.ce, g_ce),
            (self.eb, g_eb),
            (self.ec, g_ec),
            (self.ee, g_ee),
        ] {
            if let Some(h) = h {
                matrix.stamp(h, v);
            }
        }
    }
}

/// Cached handles for a four-terminal device's coupling block (MOSFET
/// drain/gate/source/bulk), addressed by `(driven terminal, controlling
/// terminal)` into the same 4-element `nodes` array passed to `bind`.
#[derive(Debug, Clone)]
pub(crate) struct NodeQuadStamp {
    handles: [[Option<ElementHandle>; 4]; 4],
}

impl NodeQuadStamp {
    pub fn uninitialized() -> Self {
        Self {
            handles: Default::default(),
        }
    }

    pub fn bind<F: Scalar>(
        matrix: &mut SparseMatrix<F>,
        nodes: [Option<usize>; 4],
    ) -> SolverResult<Self> {
        let mut handles: [[Option<ElementHandle>; 4]; 4] = Default::default();
        for (i, &r) in nodes.iter().enumerate() {
            for (j, &c) in nodes.iter().enumerate() {
                handles[i][j] = match (r, c) {
                    (Some(r), Some(c)) => Some(matrix.get_element(r, c)?),
                    _ => None,
                };
            }
        }
        Ok(Self { handles })
    }

    pub fn stamp<F: Scalar>(
        &self,
        matrix: &mut SparseMatrix<F>,
        driven: usize,
        controlling: usize,
        value: F,
    ) {
        if let Some(h) = self.handles[driven][controlling] {
            matrix.stamp(h, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_pair_stamp_matches_resistor_pattern() {
        let mut m = SparseMatrix::<f64>::new(2);
        let stamp = NodePairStamp::bind(&mut m, Some(1), Some(2)).unwrap();
        m.fix_equations();
        stamp.stamp_conductance(&mut m, 2.0);
        assert_eq!(m.value_at(1, 1), 2.0);
        assert_eq!(m.value_at(2, 2), 2.0);
        assert_eq!(m.value_at(1, 2), -2.0);
        assert_eq!(m.value_at(2, 1), -2.0);
    }

    #[test]
    fn node_pair_stamp_handles_grounded_terminal() {
        let mut m = SparseMatrix::<f64>::new(1);
        let stamp = NodePairStamp::bind(&mut m, Some(1), None).unwrap();
        m.fix_equations();
        stamp.stamp_conductance(&mut m, 3.0);
        assert_eq!(m.value_at(1, 1), 3.0);
    }

    #[test]
    fn node_branch_stamp_incidence_is_unit() {
        let mut m = SparseMatrix::<f64>::new(3);
        let branch = 3;
        let stamp = NodeBranchStamp::bind(&mut m, Some(1), Some(2), branch, false).unwrap();
        m.fix_equations();
        stamp.stamp_incidence(&mut m);
        assert_eq!(m.value_at(1, 3), 1.0);
        assert_eq!(m.value_at(3, 1), 1.0);
        assert_eq!(m.value_at(2, 3), -1.0);
        assert_eq!(m.value_at(3, 2), -1.0);
    }
}
