//! A from-scratch analog circuit simulation engine: modified nodal analysis,
//! sparse LU with Markowitz pivoting, Newton-Raphson with gmin/source
//! stepping, and variable-step Trapezoidal/Gear transient integration.
//!
//! Netlist parsing and reflection-based parameter binding are out of scope —
//! callers build a [`Devices`] catalog from [`Entity`] descriptors directly
//! (or layer a parser on top). Build a [`Circuit`] with [`Circuit::build`],
//! then run [`simulate_op`], [`simulate_dc`], [`simulate_ac`], or
//! [`simulate_trans`].

pub mod analysis;
pub mod circuit;
pub mod config;
pub mod devices;
pub mod error;
pub mod events;
pub mod integration;
pub mod newton;
pub mod scalar;
pub mod solver;
pub mod state;
pub(crate) mod util;

pub use analysis::{simulate_ac, simulate_dc, simulate_op, simulate_trans, AcPoint, Circuit, DcPoint, TransientPoint};
pub use circuit::{Entity, ParameterSet};
pub use devices::{DeviceError, Devices};
pub use error::{SimulationError, SimulationResult};
pub use events::{SimulationEvent, SweepCoordinate};

#[cfg(test)]
mod tests {
    use super::*;

    fn is_send<T: Send>() {}

    /// §5 "Send falls out naturally": a compile-time assertion that an
    /// assembled circuit can be handed to another thread.
    #[test]
    fn circuit_is_send() {
        is_send::<Circuit>();
    }

    #[test]
    fn resistor_divider_end_to_end() {
        let mut devices = Devices::new();
        devices
            .add_voltage_source(&Entity::new("V1", &["in", "0"], ParameterSet::new().with("dc", 9.0)))
            .unwrap();
        devices
            .add_resistor(&Entity::new("R1", &["in", "out"], ParameterSet::new().with("r", 2000.0)))
            .unwrap();
        devices
            .add_resistor(&Entity::new("R2", &["out", "0"], ParameterSet::new().with("r", 1000.0)))
            .unwrap();

        let mut circuit = Circuit::build(devices).unwrap();
        let convergence = config::ConvergenceConfig::default();
        let solution = simulate_op(&mut circuit, &convergence).unwrap();

        let event = SimulationEvent::new(&circuit, &solution, SweepCoordinate::None);
        assert!((event.get_voltage("out").unwrap() - 3.0).abs() < 1e-9);
        assert!((event.get_current("V1").unwrap() + 0.003).abs() < 1e-9);
    }
}
