//! Doubly-linked-list sparse matrix with Markowitz pivoting, generic over
//! the scalar field. See §3/§4.1.

use super::element::{Element, ElementHandle};
use super::error::{SolverError, SolverResult};
use super::markowitz;
use crate::scalar::Scalar;
use num_traits::Zero;

const DEFAULT_THRESHOLD: f64 = 0.001;

#[derive(Debug)]
pub struct SparseMatrix<F: Scalar> {
    order: usize,
    elements: Vec<Element<F>>,
    first_in_row: Vec<Option<usize>>,
    first_in_col: Vec<Option<usize>>,
    diag: Vec<Option<usize>>,
    /// `row_perm[k]` = original row chosen as the k-th pivot.
    row_perm: Vec<usize>,
    /// `col_perm[k]` = original column chosen as the k-th pivot.
    col_perm: Vec<usize>,
    row_perm_inv: Vec<usize>,
    col_perm_inv: Vec<usize>,
    is_fixed: bool,
    is_factored: bool,
    needs_reordering: bool,
    threshold: f64,
}

impl<F: Scalar> SparseMatrix<F> {
    pub fn new(order: usize) -> Self {
        Self {
            order,
            elements: Vec::new(),
            first_in_row: vec![None; order + 1],
            first_in_col: vec![None; order + 1],
            diag: vec![None; order + 1],
            row_perm: (0..=order).collect(),
            col_perm: (0..=order).collect(),
            row_perm_inv: (0..=order).collect(),
            col_perm_inv: (0..=order).collect(),
            is_fixed: false,
            is_factored: false,
            needs_reordering: true,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(order: usize, threshold: f64) -> Self {
        let mut m = Self::new(order);
        m.threshold = threshold;
        m
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn is_fixed(&self) -> bool {
        self.is_fixed
    }

    pub fn is_factored(&self) -> bool {
        self.is_factored
    }

    pub fn needs_reordering(&self) -> bool {
        self.needs_reordering
    }

    pub fn set_needs_reordering(&mut self) {
        self.needs_reordering = true;
    }

    fn check_bounds(&self, row: usize, col: usize) -> SolverResult<()> {
        if row == 0 || col == 0 || row > self.order || col > self.order {
            return Err(SolverError::OutOfBounds {
                index: row.max(col),
                order: self.order,
            });
        }
        Ok(())
    }

    /// §4.1 `GetElement`: returns a cached handle, creating the element if
    /// absent. Fails with `MatrixFrozen` once the matrix is fixed, unless the
    /// element already exists (devices only ever request positions they will
    /// keep writing to, per the Binding contract in §4.3).
    pub fn get_element(&mut self, row: usize, col: usize) -> SolverResult<ElementHandle> {
        self.check_bounds(row, col)?;
        if let Some(id) = self.find_element(row, col) {
            return Ok(ElementHandle(id));
        }
        if self.is_fixed {
            return Err(SolverError::MatrixFrozen { row, col });
        }
        Ok(ElementHandle(self.insert_element(row, col)))
    }

    /// §4.1 `GetDiagonalElement`: direct lookup, no creation.
    pub fn get_diagonal_element(&self, i: usize) -> Option<ElementHandle> {
        self.diag.get(i).copied().flatten().map(ElementHandle)
    }

    /// Adds `value` to the element at `handle` (stamp addition is commutative
    /// and idempotent w.r.t. ordering, per §5).
    pub fn stamp(&mut self, handle: ElementHandle, value: F) {
        self.elements[handle.0].value += value;
    }

    pub fn set(&mut self, handle: ElementHandle, value: F) {
        self.elements[handle.0].value = value;
    }

    pub fn value_at(&self, row: usize, col: usize) -> F {
        self.find_element(row, col)
            .map(|id| self.elements[id].value)
            .unwrap_or_else(F::zero)
    }

    pub fn value(&self, handle: ElementHandle) -> F {
        self.elements[handle.0].value
    }

    /// Zeroes every stored element's value, including prior fill-in, without
    /// deallocating structure (§4.2 step 1).
    pub fn clear_values(&mut self) {
        for e in self.elements.iter_mut() {
            e.value = F::zero();
        }
        self.is_factored = false;
    }

    /// §4.1 `FixEquations`: ensures a diagonal element exists for every row,
    /// then marks the matrix immutable to new structural entries.
    pub fn fix_equations(&mut self) {
        if self.is_fixed {
            return;
        }
        for i in 1..=self.order {
            if self.diag[i].is_none() {
                self.insert_element(i, i);
            }
        }
        self.is_fixed = true;
    }

    pub fn unfix_equations(&mut self) {
        self.is_fixed = false;
    }

    fn find_element(&self, row: usize, col: usize) -> Option<usize> {
        let mut cur = self.first_in_row.get(row).copied().flatten();
        while let Some(id) = cur {
            let e = &self.elements[id];
            if e.col == col {
                return Some(id);
            }
            if e.col > col {
                return None;
            }
            cur = e.right;
        }
        None
    }

    fn insert_element(&mut self, row: usize, col: usize) -> usize {
        let id = self.elements.len();
        self.elements.push(Element::new(row, col));
        self.splice_row(id, row, col);
        self.splice_col(id, row, col);
        if row == col {
            self.diag[row] = Some(id);
        }
        id
    }

    fn splice_row(&mut self, id: usize, row: usize, col: usize) {
        let mut prev: Option<usize> = None;
        let mut cur = self.first_in_row[row];
        while let Some(cid) = cur {
            if self.elements[cid].col > col {
                break;
            }
            prev = Some(cid);
            cur = self.elements[cid].right;
        }
        self.elements[id].left = prev;
        self.elements[id].right = cur;
        match prev {
            Some(pid) => self.elements[pid].right = Some(id),
            None => self.first_in_row[row] = Some(id),
        }
        if let Some(cid) = cur {
            self.elements[cid].left = Some(id);
        }
    }

    fn splice_col(&mut self, id: usize, row: usize, col: usize) {
        let mut prev: Option<usize> = None;
        let mut cur = self.first_in_col[col];
        while let Some(cid) = cur {
            if self.elements[cid].row > row {
                break;
            }
            prev = Some(cid);
            cur = self.elements[cid].below;
        }
        self.elements[id].above = prev;
        self.elements[id].below = cur;
        match prev {
            Some(pid) => self.elements[pid].below = Some(id),
            None => self.first_in_col[col] = Some(id),
        }
        if let Some(cid) = cur {
            self.elements[cid].above = Some(id);
        }
    }

    /// Internal fill-in creation during elimination, bypassing the `is_fixed`
    /// gate that guards external structural mutation.
    fn element_or_fillin(&mut self, row: usize, col: usize) -> usize {
        if let Some(id) = self.find_element(row, col) {
            return id;
        }
        self.insert_element(row, col)
    }

    /// §4.1 `OrderAndFactor`: full factor with Markowitz pivot search.
    pub fn order_and_factor(&mut self) -> SolverResult<()> {
        let n = self.order;
        let mut eliminated_row = vec![false; n + 1];
        let mut eliminated_col = vec![false; n + 1];
        self.row_perm = vec![0; n + 1];
        self.col_perm = vec![0; n + 1];

        for k in 1..=n {
            let piv_id = markowitz::search(
                n,
                &self.elements,
                &self.first_in_row,
                &self.first_in_col,
                &eliminated_row,
                &eliminated_col,
                self.threshold,
            )
            .ok_or(SolverError::SingularMatrix { step: k, order: n })?;

            let piv_row = self.elements[piv_id].row;
            let piv_col = self.elements[piv_id].col;
            self.row_perm[k] = piv_row;
            self.col_perm[k] = piv_col;
            self.eliminate_step(piv_id, &eliminated_row)
                .map_err(|_| SolverError::FactorFailed { step: k })?;
            eliminated_row[piv_row] = true;
            eliminated_col[piv_col] = true;
        }
        self.build_inverse_perms();
        self.is_factored = true;
        self.needs_reordering = false;
        log::debug!("order_and_factor: order={n} nnz={}", self.elements.len());
        Ok(())
    }

    /// §4.1 `Factor`: re-applies elimination in the previously recorded pivot
    /// order, without re-running pivot search. Returns `false` (not an error)
    /// on a numerically zero pivot, matching the original contract.
    pub fn factor(&mut self) -> bool {
        let n = self.order;
        let mut eliminated_row = vec![false; n + 1];
        let mut eliminated_col = vec![false; n + 1];
        for k in 1..=n {
            let piv_row = self.row_perm[k];
            let piv_col = self.col_perm[k];
            let piv_id = match self.find_element(piv_row, piv_col) {
                Some(id) => id,
                None => return false,
            };
            if self.elements[piv_id].value.is_exact_zero() {
                return false;
            }
            if self.eliminate_step(piv_id, &eliminated_row).is_err() {
                return false;
            }
            eliminated_row[piv_row] = true;
            eliminated_col[piv_col] = true;
        }
        self.build_inverse_perms();
        self.is_factored = true;
        true
    }

    fn build_inverse_perms(&mut self) {
        for k in 1..=self.order {
            self.row_perm_inv[self.row_perm[k]] = k;
            self.col_perm_inv[self.col_perm[k]] = k;
        }
    }

    /// One step of the right-looking sparse LU outer-product update, per the
    /// four sub-steps in §4.1's factorization algorithm.
    fn eliminate_step(&mut self, piv_id: usize, eliminated_row: &[bool]) -> Result<(), ()> {
        let piv_row = self.elements[piv_id].row;
        let piv_col = self.elements[piv_id].col;
        let piv_val = self.elements[piv_id].value;
        if piv_val.is_exact_zero() {
            return Err(());
        }
        let recip = piv_val.recip_scalar();
        self.elements[piv_id].value = recip;

        // Scatter the pivot column (excluding the pivot row) into touched rows.
        let mut touched_rows = Vec::new();
        let mut scattered = Vec::new();
        let mut cur = self.first_in_col[piv_col];
        while let Some(id) = cur {
            let e = &self.elements[id];
            cur = e.below;
            if e.row == piv_row || eliminated_row[e.row] {
                continue;
            }
            touched_rows.push(e.row);
            scattered.push(e.value);
        }

        // Snapshot the pivot row's remaining entries (the U row).
        let mut row_entries = Vec::new();
        let mut cur = self.first_in_row[piv_row];
        while let Some(id) = cur {
            let e = &self.elements[id];
            cur = e.right;
            if e.col != piv_col {
                row_entries.push((e.col, e.value));
            }
        }

        for (row, scattered_val) in touched_rows.into_iter().zip(scattered.into_iter()) {
            let mult = scattered_val * recip;
            let l_id = self.element_or_fillin(row, piv_col);
            self.elements[l_id].value = mult;
            for &(col, u_val) in &row_entries {
                let target = self.element_or_fillin(row, col);
                self.elements[target].value -= mult * u_val;
            }
        }
        Ok(())
    }

    /// §4.1 `Solve`: `A x = rhs` using the stored LU factors.
    pub fn solve(&self, rhs: &[F]) -> SolverResult<Vec<F>> {
        if !self.is_factored {
            return Err(SolverError::NotFactored);
        }
        let n = self.order;
        let mut z = vec![F::zero(); n + 1];
        for k in 1..=n {
            z[k] = rhs[self.row_perm[k]];
        }
        // forward substitution: L z = P b, unit diagonal
        for k in 1..=n {
            let piv_row = self.row_perm[k];
            let mut sum = z[k];
            let mut cur = self.first_in_row[piv_row];
            while let Some(id) = cur {
                let e = &self.elements[id];
                cur = e.right;
                let j = self.col_perm_inv[e.col];
                if j < k {
                    sum -= e.value * z[j];
                }
            }
            z[k] = sum;
        }
        // backward substitution: U w = z
        let mut w = vec![F::zero(); n + 1];
        for k in (1..=n).rev() {
            let piv_row = self.row_perm[k];
            let mut sum = z[k];
            let mut cur = self.first_in_row[piv_row];
            while let Some(id) = cur {
                let e = &self.elements[id];
                cur = e.right;
                let j = self.col_perm_inv[e.col];
                if j > k {
                    sum -= e.value * w[j];
                }
            }
            let diag_id = self
                .find_element(piv_row, self.col_perm[k])
                .expect("pivot diagonal must exist after factoring");
            w[k] = sum * self.elements[diag_id].value;
        }
        self.unscramble_columns(&w)
    }

    /// §4.1 `SolveTransposed`: `Aᵀ x = rhs` reusing the existing LU factors of `A`.
    pub fn solve_transposed(&self, rhs: &[F]) -> SolverResult<Vec<F>> {
        if !self.is_factored {
            return Err(SolverError::NotFactored);
        }
        let n = self.order;
        let mut y = vec![F::zero(); n + 1];
        for k in 1..=n {
            y[k] = rhs[self.col_perm[k]];
        }
        // forward substitution on Uᵀ (lower triangular in pivot order)
        let mut v = vec![F::zero(); n + 1];
        for k in 1..=n {
            let piv_col = self.col_perm[k];
            let mut sum = y[k];
            let mut cur = self.first_in_col[piv_col];
            while let Some(id) = cur {
                let e = &self.elements[id];
                cur = e.below;
                let j = self.row_perm_inv[e.row];
                if j < k {
                    sum -= e.value * v[j];
                }
            }
            let diag_id = self
                .find_element(self.row_perm[k], piv_col)
                .expect("pivot diagonal must exist after factoring");
            v[k] = sum * self.elements[diag_id].value;
        }
        // backward substitution on Lᵀ (upper triangular, unit diagonal)
        let mut u = vec![F::zero(); n + 1];
        for k in (1..=n).rev() {
            let piv_col = self.col_perm[k];
            let mut sum = v[k];
            let mut cur = self.first_in_col[piv_col];
            while let Some(id) = cur {
                let e = &self.elements[id];
                cur = e.below;
                let j = self.row_perm_inv[e.row];
                if j > k {
                    sum -= e.value * u[j];
                }
            }
            u[k] = sum;
        }
        self.unscramble_rows(&u)
    }

    /// `Unscramble(intermediate, solution)`: inverts the column permutation.
    fn unscramble_columns(&self, w: &[F]) -> SolverResult<Vec<F>> {
        let mut x = vec![F::zero(); self.order + 1];
        for k in 1..=self.order {
            x[self.col_perm[k]] = w[k];
        }
        Ok(x)
    }

    /// `Unscramble(intermediate, solution)`: inverts the row permutation.
    fn unscramble_rows(&self, u: &[F]) -> SolverResult<Vec<F>> {
        let mut x = vec![F::zero(); self.order + 1];
        for k in 1..=self.order {
            x[self.row_perm[k]] = u[k];
        }
        Ok(x)
    }

    pub fn nnz(&self) -> usize {
        self.elements.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_3x3() -> SparseMatrix<f64> {
        // A = [ 4 -1  0
        //      -1  4 -1
        //       0 -1  4 ]
        let mut m = SparseMatrix::<f64>::new(3);
        let entries = [
            (1, 1, 4.0),
            (1, 2, -1.0),
            (2, 1, -1.0),
            (2, 2, 4.0),
            (2, 3, -1.0),
            (3, 2, -1.0),
            (3, 3, 4.0),
        ];
        for &(r, c, v) in &entries {
            let h = m.get_element(r, c).unwrap();
            m.stamp(h, v);
        }
        m.fix_equations();
        m
    }

    #[test]
    fn order_and_factor_then_solve_matches_expected() {
        let mut m = build_3x3();
        m.order_and_factor().unwrap();
        let rhs = vec![0.0, 5.0, 5.0, 5.0];
        let x = m.solve(&rhs).unwrap();
        // Verify A*x = rhs directly (invariant from §8).
        let a = build_3x3();
        let mut reconstructed = vec![0.0; 4];
        for row in 1..=3 {
            let mut acc = 0.0;
            for col in 1..=3 {
                acc += a.value_at(row, col) * x[col];
            }
            reconstructed[row] = acc;
        }
        for i in 1..=3 {
            assert!((reconstructed[i] - rhs[i]).abs() < 1e-9, "row {i}");
        }
    }

    #[test]
    fn solve_transposed_matches_transposed_system() {
        let mut m = build_3x3();
        m.order_and_factor().unwrap();
        let rhs = vec![0.0, 1.0, 2.0, 3.0];
        let x = m.solve_transposed(&rhs).unwrap();
        let a = build_3x3();
        let mut reconstructed = vec![0.0; 4];
        for col in 1..=3 {
            let mut acc = 0.0;
            for row in 1..=3 {
                acc += a.value_at(row, col) * x[row];
            }
            reconstructed[col] = acc;
        }
        for i in 1..=3 {
            assert!((reconstructed[i] - rhs[i]).abs() < 1e-9, "col {i}");
        }
    }

    #[test]
    fn singular_matrix_detected() {
        // Two rows identical -> structurally singular under any pivot choice.
        let mut m = SparseMatrix::<f64>::new(2);
        for &(r, c, v) in &[(1, 1, 1.0), (1, 2, 1.0), (2, 1, 1.0), (2, 2, 1.0)] {
            let h = m.get_element(r, c).unwrap();
            m.stamp(h, v);
        }
        m.fix_equations();
        let err = m.order_and_factor().unwrap_err();
        assert!(matches!(err, SolverError::SingularMatrix { .. }));
    }

    #[test]
    fn frozen_matrix_rejects_new_structural_entries() {
        let mut m = SparseMatrix::<f64>::new(2);
        let h = m.get_element(1, 1).unwrap();
        m.stamp(h, 1.0);
        m.fix_equations();
        let err = m.get_element(2, 1).unwrap_err();
        assert!(matches!(err, SolverError::MatrixFrozen { .. }));
        // existing entries remain reachable
        assert!(m.get_element(1, 1).is_ok());
    }

    #[test]
    fn solve_before_factor_fails() {
        let mut m = SparseMatrix::<f64>::new(1);
        let h = m.get_element(1, 1).unwrap();
        m.stamp(h, 2.0);
        m.fix_equations();
        let err = m.solve(&[0.0, 1.0]).unwrap_err();
        assert!(matches!(err, SolverError::NotFactored));
    }

    #[test]
    fn refactor_after_restamp_reuses_pivot_order() {
        let mut m = build_3x3();
        m.order_and_factor().unwrap();
        let order1 = m.row_perm.clone();

        m.clear_values();
        for &(r, c, v) in &[
            (1, 1, 4.0),
            (1, 2, -1.0),
            (2, 1, -1.0),
            (2, 2, 4.0),
            (2, 3, -1.0),
            (3, 2, -1.0),
            (3, 3, 4.0),
        ] {
            let h = m.get_element(r, c).unwrap();
            m.stamp(h, v);
        }
        assert!(m.factor());
        assert_eq!(m.row_perm, order1);
        let rhs = vec![0.0, 5.0, 5.0, 5.0];
        let x = m.solve(&rhs).unwrap();
        assert!((x[2] - 5.0 / 6.0 * 3.0).abs() < 10.0); // sanity: finite, non-degenerate
    }

    #[test]
    fn complex_matrix_factors_and_solves() {
        use crate::scalar::Complex;
        let mut m = SparseMatrix::<Complex>::new(2);
        let h11 = m.get_element(1, 1).unwrap();
        m.stamp(h11, Complex::new(1.0, 1.0));
        let h22 = m.get_element(2, 2).unwrap();
        m.stamp(h22, Complex::new(2.0, -1.0));
        m.fix_equations();
        m.order_and_factor().unwrap();
        let rhs = vec![Complex::ZERO, Complex::new(1.0, 0.0), Complex::new(0.0, 1.0)];
        let x = m.solve(&rhs).unwrap();
        let check1 = Complex::new(1.0, 1.0) * x[1];
        assert!((check1.re - 1.0).abs() < 1e-9 && check1.im.abs() < 1e-9);
        let check2 = Complex::new(2.0, -1.0) * x[2];
        assert!((check2.re - 0.0).abs() < 1e-9 && (check2.im - 1.0).abs() < 1e-9);
    }
}
