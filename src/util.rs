pub(crate) fn get_voltage_diff(
    voltages: &[f64],
    positive: Option<usize>,
    negative: Option<usize>,
) -> f64 {
    match (positive, negative) {
        (Some(positive), Some(negative)) => voltages[positive] - voltages[negative],
        (Some(positive), None) => voltages[positive],
        (None, Some(negative)) => -voltages[negative],
        (None, None) => 0.0,
    }
}

/// Ground (MNA index 0) is never stamped; devices address it as `None`.
pub(crate) fn node_ref(idx: usize) -> Option<usize> {
    (idx != crate::circuit::GROUND).then_some(idx)
}

/// Adds an equivalent current `value` flowing from `negative` to `positive`
/// into an RHS vector (`+` at `positive`, `-` at `negative`), the convention
/// every current-contributing device (sources, diode/BJT linearization,
/// reactive companion models) shares.
pub(crate) fn stamp_rhs_current(rhs: &mut [f64], positive: Option<usize>, negative: Option<usize>, value: f64) {
    if let Some(p) = positive {
        rhs[p] += value;
    }
    if let Some(n) = negative {
        rhs[n] -= value;
    }
}
