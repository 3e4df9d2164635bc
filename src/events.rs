//! §6 "Subscribe to the `ExportSimulationData` event": a lazy read-only view
//! over one accepted point. Nothing is unpacked eagerly — `get_voltage`,
//! `get_current`, and friends resolve against the solved vector on first
//! read, the same "lazy handle, resolved on first read" contract as the
//! property-export path the programmatic surface describes.

use crate::analysis::Circuit;
use crate::scalar::Scalar;

/// The independent coordinate that produced one emitted point: absent for a
/// bare operating point, simulated time for transient, angular-adjacent
/// frequency for AC, or the swept source's value for a DC sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SweepCoordinate {
    None,
    Time(f64),
    Frequency(f64),
    SweepValue(f64),
}

/// One point handed to a caller-supplied observer. Generic over the same
/// `Scalar` the solved vector is generic over, so a transient/DC observer
/// reads plain `f64` and an AC observer reads `Complex` without either
/// needing to know about the other's representation.
pub struct SimulationEvent<'a, T: Scalar> {
    circuit: &'a Circuit,
    solution: &'a [T],
    coordinate: SweepCoordinate,
}

impl<'a, T: Scalar> SimulationEvent<'a, T> {
    pub fn new(circuit: &'a Circuit, solution: &'a [T], coordinate: SweepCoordinate) -> Self {
        Self {
            circuit,
            solution,
            coordinate,
        }
    }

    /// `GetVoltage(nodeName)`: `None` for a name the circuit never interned,
    /// `Some(T::zero())` for ground.
    pub fn get_voltage(&self, node_name: &str) -> Option<T> {
        self.circuit.node_index(node_name).map(|idx| {
            if idx == crate::circuit::GROUND {
                T::from_real(0.0)
            } else {
                self.solution[idx]
            }
        })
    }

    /// `GetCurrent(branchName)`: only voltage sources and CCVS carry a
    /// branch unknown to read.
    pub fn get_current(&self, branch_name: &str) -> Option<T> {
        self.circuit.branch_index(branch_name).map(|idx| self.solution[idx])
    }

    pub fn get_time(&self) -> Option<f64> {
        match self.coordinate {
            SweepCoordinate::Time(t) => Some(t),
            _ => None,
        }
    }

    pub fn get_frequency(&self) -> Option<f64> {
        match self.coordinate {
            SweepCoordinate::Frequency(f) => Some(f),
            _ => None,
        }
    }

    pub fn get_sweep_value(&self) -> Option<f64> {
        match self.coordinate {
            SweepCoordinate::SweepValue(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Entity, ParameterSet};
    use crate::devices::Devices;

    fn divider_circuit() -> Circuit {
        let mut devices = Devices::new();
        devices
            .add_voltage_source(&Entity::new("V1", &["in", "0"], ParameterSet::new().with("dc", 10.0)))
            .unwrap();
        devices
            .add_resistor(&Entity::new("R1", &["in", "out"], ParameterSet::new().with("r", 1000.0)))
            .unwrap();
        devices
            .add_resistor(&Entity::new("R2", &["out", "0"], ParameterSet::new().with("r", 1000.0)))
            .unwrap();
        Circuit::build(devices).unwrap()
    }

    #[test]
    fn get_voltage_resolves_named_nodes_and_ground() {
        let circuit = divider_circuit();
        let solution = vec![0.0, 10.0, 5.0];
        let event = SimulationEvent::new(&circuit, &solution, SweepCoordinate::Time(1.5));
        assert_eq!(event.get_voltage("out"), Some(5.0));
        assert_eq!(event.get_voltage("0"), Some(0.0));
        assert_eq!(event.get_voltage("nope"), None);
        assert_eq!(event.get_time(), Some(1.5));
        assert_eq!(event.get_frequency(), None);
    }

    #[test]
    fn get_current_resolves_named_branch() {
        let circuit = divider_circuit();
        let order = circuit.matrix_order();
        let mut solution = vec![0.0; order + 1];
        solution[order] = 0.005;
        let event = SimulationEvent::new(&circuit, &solution, SweepCoordinate::None);
        assert_eq!(event.get_current("V1"), Some(0.005));
        assert_eq!(event.get_current("nope"), None);
    }
}
