//! §3 History: the integration-method-owned ring of past solution slices.
//! Shared by every concrete [`super::IntegrationMethod`] so that the Gear
//! divided-difference formula and the Trapezoidal two-level recurrence read
//! from the same committed-time/committed-value bookkeeping, and so both can
//! offer the same Lagrange-extrapolation predictor for LTE estimation.

use std::collections::VecDeque;

/// Handle to a state variable's slot in a [`History`]. Opaque outside this
/// crate; devices only ever pass it back to the method that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHandle(pub(crate) usize);

#[derive(Debug, Clone)]
pub(crate) struct History {
    depth: usize,
    times: VecDeque<f64>,
    values: Vec<VecDeque<f64>>,
    pending_time: f64,
    pending: Vec<Option<f64>>,
}

impl History {
    /// `depth` is `MaxOrder + 2` per §4.4.
    pub(crate) fn new(depth: usize) -> Self {
        Self {
            depth,
            times: VecDeque::with_capacity(depth),
            values: Vec::new(),
            pending_time: 0.0,
            pending: Vec::new(),
        }
    }

    /// Allocates a new state slot, zero-initialized per the resolved "History
    /// ring zero-initializes all state slots at allocation" open question.
    pub(crate) fn request_state(&mut self) -> StateHandle {
        let handle = StateHandle(self.values.len());
        let mut slot = VecDeque::with_capacity(self.depth);
        slot.push_front(0.0);
        self.values.push(slot);
        self.pending.push(None);
        handle
    }

    pub(crate) fn begin_step(&mut self, time: f64) {
        self.pending_time = time;
        for p in &mut self.pending {
            *p = None;
        }
    }

    pub(crate) fn record(&mut self, handle: StateHandle, value: f64) {
        self.pending[handle.0] = Some(value);
    }

    pub(crate) fn committed_len(&self) -> usize {
        self.times.len()
    }

    pub(crate) fn last_value(&self, handle: StateHandle) -> f64 {
        self.values[handle.0].front().copied().unwrap_or(0.0)
    }

    /// Times `[t_n, t_{n-1}, ...]` used for the node-0 derivative formula:
    /// the pending (about-to-be-committed) time followed by up to
    /// `committed` entries of committed history.
    pub(crate) fn times_with_pending(&self, committed: usize) -> Vec<f64> {
        let mut out = Vec::with_capacity(committed + 1);
        out.push(self.pending_time);
        out.extend(self.times.iter().take(committed));
        out
    }

    pub(crate) fn values_with_pending(&self, handle: StateHandle, value: f64, committed: usize) -> Vec<f64> {
        let mut out = Vec::with_capacity(committed + 1);
        out.push(value);
        out.extend(self.values[handle.0].iter().take(committed));
        out
    }

    /// Lagrange-polynomial extrapolation of `handle`'s value to `self.pending_time`
    /// using `order + 1` *previously committed* points only (the predictor for
    /// LTE estimation must not see the value it is trying to validate).
    pub(crate) fn predict(&self, handle: StateHandle, order: usize) -> Option<f64> {
        if self.times.len() < order + 1 {
            return None;
        }
        let points: Vec<(f64, f64)> = self
            .times
            .iter()
            .zip(self.values[handle.0].iter())
            .take(order + 1)
            .map(|(&t, &v)| (t, v))
            .collect();
        Some(lagrange_value_at(&points, self.pending_time))
    }

    pub(crate) fn commit(&mut self) {
        self.times.push_front(self.pending_time);
        if self.times.len() > self.depth {
            self.times.pop_back();
        }
        for (slot, pending) in self.values.iter_mut().zip(self.pending.iter()) {
            let v = pending.unwrap_or_else(|| slot.front().copied().unwrap_or(0.0));
            slot.push_front(v);
            if slot.len() > self.depth {
                slot.pop_back();
            }
        }
    }

    pub(crate) fn rollback(&mut self) {
        for p in &mut self.pending {
            *p = None;
        }
    }
}

/// Evaluates the Lagrange interpolating polynomial through `points` at `t`.
pub(crate) fn lagrange_value_at(points: &[(f64, f64)], t: f64) -> f64 {
    let mut result = 0.0;
    for (i, &(ti, yi)) in points.iter().enumerate() {
        let mut term = yi;
        for (j, &(tj, _)) in points.iter().enumerate() {
            if i != j {
                term *= (t - tj) / (ti - tj);
            }
        }
        result += term;
    }
    result
}

/// Coefficients `c[]` such that `sum_i c[i] * y(times[i]) ≈ dy/dt` at
/// `times[0]`, derived by differentiating the Lagrange polynomial through
/// `times` and evaluating that derivative at its own node `times[0]`. This is
/// the general variable-step backward-difference (Gear/BDF) formula; for
/// `times = [t_n, t_n-h]` it reduces to the familiar `1/h, -1/h` backward
/// Euler pair, and similarly recovers the standard 3-point BDF2 coefficients
/// for a uniform step.
pub(crate) fn derivative_coefficients_at_node0(times: &[f64]) -> Vec<f64> {
    let n = times.len();
    let t0 = times[0];
    let mut c = vec![0.0; n];
    let mut c0 = 0.0;
    for &tm in times.iter().skip(1) {
        c0 += 1.0 / (t0 - tm);
    }
    c[0] = c0;
    for i in 1..n {
        let ti = times[i];
        let mut term = 1.0 / (ti - t0);
        for (m, &tm) in times.iter().enumerate().skip(1) {
            if m != i {
                term *= (t0 - tm) / (ti - tm);
            }
        }
        c[i] = term;
    }
    c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backward_euler_coefficients_match_finite_difference() {
        let c = derivative_coefficients_at_node0(&[10.0, 9.0]);
        assert!((c[0] - 1.0).abs() < 1e-12);
        assert!((c[1] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn bdf2_uniform_step_matches_textbook_coefficients() {
        let h = 0.1;
        let c = derivative_coefficients_at_node0(&[0.0, -h, -2.0 * h]);
        assert!((c[0] - 1.5 / h).abs() < 1e-9);
        assert!((c[1] + 2.0 / h).abs() < 1e-9);
        assert!((c[2] - 0.5 / h).abs() < 1e-9);
    }

    #[test]
    fn lagrange_reproduces_linear_function_exactly() {
        let points = [(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)];
        assert!((lagrange_value_at(&points, 1.5) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn history_commit_and_predict_roundtrip() {
        let mut h = History::new(4);
        let s = h.request_state();
        for (t, v) in [(1.0, 1.0), (2.0, 2.0), (3.0, 3.0)] {
            h.begin_step(t);
            h.record(s, v);
            h.commit();
        }
        h.begin_step(4.0);
        let predicted = h.predict(s, 1).unwrap();
        assert!((predicted - 4.0).abs() < 1e-9);
    }
}
