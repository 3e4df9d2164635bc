//! §4.5 "AC": one complex factor/solve per frequency around the converged
//! operating point (Laplace = jω), in the native `Complex` instantiation of
//! the sparse matrix. Frequency points are enumerated lazily per §6's
//! `lin`/`dec`/`oct` sweep kinds.

use std::f64::consts::PI;

use crate::config::{AcConfig, SweepKind};
use crate::error::SimulationResult;
use crate::scalar::Complex;
use crate::solver::SparseMatrix;

use super::Circuit;

/// One solved frequency point: the converged phasor solution (1-based,
/// index 0 unused) at `frequency` Hz.
#[derive(Debug, Clone)]
pub struct AcPoint {
    pub frequency: f64,
    pub solution: Vec<Complex>,
}

/// Expands a sweep configuration into the ordered list of frequencies (Hz)
/// it visits. `Linear` divides `[start, stop]` into `npoints` samples
/// inclusive; `Decade`/`Octave` step `npoints` times per decade/octave.
fn frequencies(config: &AcConfig) -> Vec<f64> {
    match config.kind {
        SweepKind::Linear => {
            if config.npoints <= 1 {
                return vec![config.start];
            }
            let step = (config.stop - config.start) / (config.npoints - 1) as f64;
            (0..config.npoints).map(|i| config.start + step * i as f64).collect()
        }
        SweepKind::Decade | SweepKind::Octave => {
            let base = if config.kind == SweepKind::Decade { 10.0 } else { 2.0 };
            let total = (config.stop / config.start).log(base);
            let total_points = (total * config.npoints as f64).round() as usize;
            (0..=total_points)
                .map(|i| config.start * base.powf(i as f64 / config.npoints as f64))
                .collect()
        }
    }
}

/// Runs an AC sweep. The circuit's real bias point must already be
/// converged (devices linearize their small-signal stamp around whatever
/// `load_bias` last wrote, per §4.5) before calling this.
pub fn simulate_ac(circuit: &mut Circuit, config: &AcConfig) -> SimulationResult<Vec<AcPoint>> {
    let order = circuit.nodes.mna_matrix_dim();
    let mut matrix = SparseMatrix::<Complex>::new(order);
    circuit.devices.bind_complex(&mut matrix)?;
    matrix.fix_equations();

    let mut points = Vec::new();
    for (i, freq) in frequencies(config).into_iter().enumerate() {
        let omega = 2.0 * PI * freq;
        matrix.clear_values();
        let mut rhs = vec![Complex::ZERO; order + 1];
        circuit.devices.load_frequency(&mut matrix, &mut rhs, omega);

        if i == 0 {
            matrix.order_and_factor()?;
        } else if !matrix.factor() {
            matrix.order_and_factor()?;
        }
        let solution = matrix.solve(&rhs)?;
        points.push(AcPoint { frequency: freq, solution });
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Entity, ParameterSet};
    use crate::config::ConvergenceConfig;
    use crate::devices::Devices;
    use crate::scalar::Scalar;

    #[test]
    fn low_pass_3db_point() {
        let mut devices = Devices::new();
        devices
            .add_voltage_source(
                &Entity::new("V1", &["in", "0"], ParameterSet::new().with("dc", 0.0).with("acmag", 1.0)),
            )
            .unwrap();
        devices
            .add_resistor(&Entity::new("R1", &["in", "out"], ParameterSet::new().with("r", 1000.0)))
            .unwrap();
        devices
            .add_capacitor(&Entity::new("C1", &["out", "0"], ParameterSet::new().with("c", 1e-6)))
            .unwrap();

        let mut circuit = Circuit::build(devices).unwrap();
        super::super::simulate_op(&mut circuit, &ConvergenceConfig::default()).unwrap();

        let corner = 1.0 / (2.0 * PI * 1000.0 * 1e-6);
        let config = AcConfig {
            kind: SweepKind::Linear,
            npoints: 1,
            start: corner,
            stop: corner,
            keepopinfo: false,
        };
        let points = simulate_ac(&mut circuit, &config).unwrap();
        let out = circuit.nodes.node_index("out").unwrap();
        let mag = points[0].solution[out].magnitude();
        assert!((mag - 1.0 / 2.0_f64.sqrt()).abs() < 1e-2);
    }

    #[test]
    fn decade_sweep_spans_the_requested_range() {
        let config = AcConfig {
            kind: SweepKind::Decade,
            npoints: 10,
            start: 1.0,
            stop: 1_000_000.0,
            keepopinfo: false,
        };
        let freqs = frequencies(&config);
        assert!((freqs.first().copied().unwrap() - 1.0).abs() < 1e-9);
        assert!((freqs.last().copied().unwrap() - 1_000_000.0).abs() / 1_000_000.0 < 1e-6);
    }
}
