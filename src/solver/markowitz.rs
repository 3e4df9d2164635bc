//! Pivot search: Markowitz cost minimization subject to a numerical threshold test.

use super::element::Element;
use crate::scalar::Scalar;

/// Picks the next pivot among elements whose row and column are both still
/// active (not yet chosen as a previous pivot), per spec §4.1:
/// minimize `(r-1)(c-1)` subject to `|p| >= threshold * max|column|`, ties
/// broken by preferring the diagonal, then row-major encounter order.
pub(super) fn search<F: Scalar>(
    order: usize,
    elements: &[Element<F>],
    first_in_row: &[Option<usize>],
    first_in_col: &[Option<usize>],
    eliminated_row: &[bool],
    eliminated_col: &[bool],
    threshold: f64,
) -> Option<usize> {
    let col_max: Vec<f64> = (0..=order)
        .map(|c| {
            if c == 0 || eliminated_col[c] {
                0.0
            } else {
                active_col_max(c, elements, first_in_col, eliminated_row)
            }
        })
        .collect();

    let mut best_id: Option<usize> = None;
    let mut best_cost = usize::MAX;
    let mut best_diag = false;

    for row in 1..=order {
        if eliminated_row[row] {
            continue;
        }
        let row_count = active_row_count(row, elements, first_in_row, eliminated_col);
        let mut cur = first_in_row[row];
        while let Some(id) = cur {
            let e = &elements[id];
            cur = e.right;
            let col = e.col;
            if eliminated_col[col] {
                continue;
            }
            let cmax = col_max[col];
            if cmax == 0.0 {
                continue;
            }
            if e.value.magnitude() < threshold * cmax {
                continue;
            }
            let col_count = active_col_count(col, elements, first_in_col, eliminated_row);
            let cost = row_count.saturating_sub(1) * col_count.saturating_sub(1);
            let is_diag = row == col;

            let better = match best_id {
                None => true,
                Some(_) => {
                    cost < best_cost || (cost == best_cost && is_diag && !best_diag)
                }
            };
            if better {
                best_id = Some(id);
                best_cost = cost;
                best_diag = is_diag;
            }
        }
    }
    best_id
}

fn active_row_count<F: Scalar>(
    row: usize,
    elements: &[Element<F>],
    first_in_row: &[Option<usize>],
    eliminated_col: &[bool],
) -> usize {
    let mut count = 0;
    let mut cur = first_in_row[row];
    while let Some(id) = cur {
        let e = &elements[id];
        if !eliminated_col[e.col] {
            count += 1;
        }
        cur = e.right;
    }
    count
}

fn active_col_count<F: Scalar>(
    col: usize,
    elements: &[Element<F>],
    first_in_col: &[Option<usize>],
    eliminated_row: &[bool],
) -> usize {
    let mut count = 0;
    let mut cur = first_in_col[col];
    while let Some(id) = cur {
        let e = &elements[id];
        if !eliminated_row[e.row] {
            count += 1;
        }
        cur = e.below;
    }
    count
}

fn active_col_max<F: Scalar>(
    col: usize,
    elements: &[Element<F>],
    first_in_col: &[Option<usize>],
    eliminated_row: &[bool],
) -> f64 {
    let mut max = 0.0f64;
    let mut cur = first_in_col[col];
    while let Some(id) = cur {
        let e = &elements[id];
        if !eliminated_row[e.row] {
            let m = e.value.magnitude();
            if m > max {
                max = m;
            }
        }
        cur = e.below;
    }
    max
}
