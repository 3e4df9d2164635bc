//! §3 "Simulation State": the mutable state every device behavior reads
//! when it stamps, and the Newton driver reads/writes every iteration.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalysisPhase {
    Biasing,
    Frequency,
    Transient,
}

/// Solution-vector-and-RHS bookkeeping shared by every analysis. Indexing is
/// 1-based (index 0 is unused, mirroring the matrix's node 0 = ground
/// convention) so a device's MNA index can be used directly.
#[derive(Clone, Debug)]
pub struct SimulationState {
    pub phase: AnalysisPhase,
    /// Previous Newton iterate; devices linearize around this.
    pub previous: Vec<f64>,
    pub rhs: Vec<f64>,
    pub gmin: f64,
    pub temperature_celsius: f64,
    /// Independent-source scale factor for source stepping, `1.0` normally.
    pub source_factor: f64,
    pub use_initial_conditions: bool,
    /// Simulation time independent source waveforms evaluate at; `0.0` outside
    /// transient analysis.
    pub time: f64,
}

impl SimulationState {
    pub fn new(order: usize, temperature_celsius: f64) -> Self {
        Self {
            phase: AnalysisPhase::Biasing,
            previous: vec![0.0; order + 1],
            rhs: vec![0.0; order + 1],
            gmin: 0.0,
            temperature_celsius,
            source_factor: 1.0,
            use_initial_conditions: false,
            time: 0.0,
        }
    }

    pub fn voltage_diff(&self, positive: Option<usize>, negative: Option<usize>) -> f64 {
        crate::util::get_voltage_diff(&self.previous, positive, negative)
    }

    pub fn clear_rhs(&mut self) {
        for v in self.rhs.iter_mut() {
            *v = 0.0;
        }
    }
}
