//! §6 configuration surface: tunables shared by every analysis, plus the
//! per-analysis option groups.

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IntegrationMethodKind {
    Trapezoidal,
    Gear,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SweepKind {
    Linear,
    Decade,
    Octave,
}

/// Convergence and homotopy tolerances shared by every analysis that runs
/// the Newton driver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConvergenceConfig {
    pub abstol: f64,
    pub reltol: f64,
    pub vntol: f64,
    pub gmin: f64,
    pub itl1: usize,
    pub itl4: usize,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            abstol: 1e-12,
            reltol: 1e-3,
            vntol: 1e-6,
            gmin: 1e-12,
            itl1: 100,
            itl4: 10,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransientConfig {
    pub init: f64,
    pub stop: f64,
    pub step: f64,
    pub maxstep: Option<f64>,
    pub method: IntegrationMethodKind,
    pub useic: bool,
    pub trtol: f64,
    pub chgtol: f64,
}

impl TransientConfig {
    pub fn new(init: f64, stop: f64, step: f64) -> Self {
        Self {
            init,
            stop,
            step,
            maxstep: None,
            method: IntegrationMethodKind::Trapezoidal,
            useic: false,
            trtol: 7.0,
            chgtol: 1e-14,
        }
    }

    /// Defaults to `(stop - init) / 50` per §6.
    pub fn effective_maxstep(&self) -> f64 {
        self.maxstep.unwrap_or((self.stop - self.init) / 50.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AcConfig {
    pub kind: SweepKind,
    pub npoints: usize,
    pub start: f64,
    pub stop: f64,
    pub keepopinfo: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct SimulationConfig {
    pub convergence: ConvergenceConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_maxstep_default() {
        let cfg = TransientConfig::new(0.0, 10.0, 1.0);
        assert_eq!(cfg.effective_maxstep(), 0.2);
    }

    #[test]
    fn convergence_defaults_match_spec() {
        let cfg = ConvergenceConfig::default();
        assert_eq!(cfg.abstol, 1e-12);
        assert_eq!(cfg.reltol, 1e-3);
        assert_eq!(cfg.itl1, 100);
        assert_eq!(cfg.itl4, 10);
    }
}
