//! §6 "CLI (expansion, ambient)": a thin `clap`-derive binary that loads a
//! flat fixture describing a pre-built circuit, runs one analysis over it,
//! and prints accepted points to stdout. Not part of the library's public
//! contract — a runnable entry point for exercising the engine directly,
//! not a netlist/reflection front end (explicitly out of scope for the
//! library itself).

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use mna_core::config::{AcConfig, ConvergenceConfig, IntegrationMethodKind, SweepKind, TransientConfig};
use mna_core::{Circuit, Devices, Entity, ParameterSet, SimulationEvent, SweepCoordinate};

#[derive(Parser, Debug)]
#[command(about = "Runs one analysis over a fixture circuit description.", version)]
struct Args {
    /// Path to a fixture file (one device per line; see `parse_fixture`).
    circuit: PathBuf,

    #[command(subcommand)]
    analysis: Analysis,
}

#[derive(Subcommand, Debug)]
enum Analysis {
    /// Operating point.
    Op,
    /// DC sweep of one named independent source.
    Dc {
        source: String,
        start: f64,
        stop: f64,
        step: f64,
    },
    /// AC sweep around the converged operating point.
    Ac {
        #[arg(value_enum)]
        kind: AcKindArg,
        npoints: usize,
        start: f64,
        stop: f64,
    },
    /// Transient analysis from t=0.
    Tran {
        stop: f64,
        step: f64,
        #[arg(long, value_enum, default_value = "trapezoidal")]
        method: MethodArg,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum AcKindArg {
    Lin,
    Dec,
    Oct,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum MethodArg {
    Trapezoidal,
    Gear,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let text = match fs::read_to_string(&args.circuit) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("failed to read {}: {e}", args.circuit.display());
            return ExitCode::FAILURE;
        }
    };

    let devices = match parse_fixture(&text) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("fixture error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut circuit = match Circuit::build(devices) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("setup failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let convergence = ConvergenceConfig::default();

    match run(&mut circuit, &convergence, &args.analysis) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("simulation failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(circuit: &mut Circuit, convergence: &ConvergenceConfig, analysis: &Analysis) -> mna_core::SimulationResult<()> {
    match analysis {
        Analysis::Op => {
            let solution = mna_core::simulate_op(circuit, convergence)?;
            print_point(circuit, &solution, SweepCoordinate::None);
        }
        Analysis::Dc {
            source,
            start,
            stop,
            step,
        } => {
            let values = linspace(*start, *stop, *step);
            let points = mna_core::simulate_dc(circuit, source, &values, convergence)?;
            for point in &points {
                print_point(circuit, &point.solution, SweepCoordinate::SweepValue(point.sweep_value));
            }
        }
        Analysis::Ac {
            kind,
            npoints,
            start,
            stop,
        } => {
            let config = AcConfig {
                kind: match kind {
                    AcKindArg::Lin => SweepKind::Linear,
                    AcKindArg::Dec => SweepKind::Decade,
                    AcKindArg::Oct => SweepKind::Octave,
                },
                npoints: *npoints,
                start: *start,
                stop: *stop,
                keepopinfo: false,
            };
            mna_core::simulate_op(circuit, convergence)?;
            let points = mna_core::simulate_ac(circuit, &config)?;
            for point in &points {
                print_point(circuit, &point.solution, SweepCoordinate::Frequency(point.frequency));
            }
        }
        Analysis::Tran { stop, step, method } => {
            let mut config = TransientConfig::new(0.0, *stop, *step);
            config.method = match method {
                MethodArg::Trapezoidal => IntegrationMethodKind::Trapezoidal,
                MethodArg::Gear => IntegrationMethodKind::Gear,
            };
            let points = mna_core::simulate_trans(circuit, convergence, &config, &[])?;
            for point in &points {
                print_point(circuit, &point.solution, SweepCoordinate::Time(point.time));
            }
        }
    }
    Ok(())
}

fn linspace(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 {
        return vec![start];
    }
    let mut values = Vec::new();
    let mut v = start;
    while v <= stop + step * 0.5 {
        values.push(v);
        v += step;
    }
    values
}

fn print_point<T: mna_core::scalar::Scalar>(circuit: &Circuit, solution: &[T], coordinate: SweepCoordinate) {
    let event = SimulationEvent::new(circuit, solution, coordinate);
    let mut fields = Vec::new();
    if let Some(t) = event.get_time() {
        fields.push(format!("t={t:e}"));
    }
    if let Some(f) = event.get_frequency() {
        fields.push(format!("f={f:e}"));
    }
    if let Some(v) = event.get_sweep_value() {
        fields.push(format!("sweep={v:e}"));
    }
    for name in circuit.node_names() {
        if let Some(v) = event.get_voltage(name) {
            fields.push(format!("V({name})={v}"));
        }
    }
    println!("{}", fields.join(" "));
}

/// Parses a fixture: one device per non-empty, non-`#`-comment line,
/// `<kind> <name> <node>... <key=value>...`. `kind` is the usual SPICE
/// first-letter convention (R, C, L, D, Q, M, V, I, E, G, H, F). Controlled
/// sources H/F take their controlling source's name via `vname=<name>`
/// rather than a numeric parameter.
fn parse_fixture(text: &str) -> Result<Devices, String> {
    let mut devices = Devices::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let kind = tokens[0].chars().next().unwrap_or(' ').to_ascii_uppercase();
        let name = *tokens.get(1).ok_or_else(|| format!("line {}: missing name", lineno + 1))?;

        let node_count = match kind {
            'R' | 'C' | 'L' | 'D' | 'V' | 'I' | 'H' | 'F' => 2,
            'Q' => 3,
            'M' | 'E' | 'G' => 4,
            other => return Err(format!("line {}: unknown device kind '{other}'", lineno + 1)),
        };
        if tokens.len() < 2 + node_count {
            return Err(format!("line {}: '{name}' needs {node_count} nodes", lineno + 1));
        }
        let nodes: Vec<&str> = tokens[2..2 + node_count].to_vec();
        let mut params = ParameterSet::new();
        for token in &tokens[2 + node_count..] {
            let (key, value) = token
                .split_once('=')
                .ok_or_else(|| format!("line {}: expected key=value, got '{token}'", lineno + 1))?;
            if key == "vname" {
                params = params.with_str(key, value);
            } else {
                let parsed: f64 = value
                    .parse()
                    .map_err(|_| format!("line {}: bad number '{value}' for '{key}'", lineno + 1))?;
                params = params.with(key, parsed);
            }
        }

        let entity = Entity::new(name, &nodes, params);
        let result = match kind {
            'R' => devices.add_resistor(&entity),
            'C' => devices.add_capacitor(&entity),
            'L' => devices.add_inductor(&entity),
            'D' => devices.add_diode(&entity),
            'Q' => devices.add_bjt(&entity),
            'M' => devices.add_mosfet(&entity),
            'V' => devices.add_voltage_source(&entity),
            'I' => devices.add_current_source(&entity),
            'E' => devices.add_vcvs(&entity),
            'G' => devices.add_vccs(&entity),
            'H' => devices.add_ccvs(&entity),
            'F' => devices.add_cccs(&entity),
            _ => unreachable!(),
        };
        result.map_err(|e| format!("line {}: {e}", lineno + 1))?;
    }

    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_resistor_divider() {
        let fixture = "V V1 in 0 dc=10\nR R1 in out r=1000\nR R2 out 0 r=1000\n";
        let devices = parse_fixture(fixture).unwrap();
        let circuit = Circuit::build(devices).unwrap();
        assert!(circuit.node_index("out").is_some());
    }

    #[test]
    fn rejects_an_unknown_device_kind() {
        assert!(parse_fixture("Z Z1 a b\n").is_err());
    }
}
