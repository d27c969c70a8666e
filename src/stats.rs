use serde::Serialize;

/// Time-averaged observables of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObservableSummary {
    pub samples: usize,
    /// ⟨E⟩ [J]
    pub energy: f64,
    /// ⟨E²⟩ − ⟨E⟩² [J²]
    pub energy_variance: f64,
    /// ⟨|m|⟩
    pub magnetization: f64,
    /// ⟨|m|²⟩
    pub magnetization_sq: f64,
}

/// Running sums of energy and normalised magnetization magnitude, sampled
/// during a run.
#[derive(Debug, Default)]
pub struct Recorder {
    samples: usize,
    energy: f64,
    energy_sq: f64,
    magnetization: f64,
    magnetization_sq: f64,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, energy: f64, magnetization: f64) {
        self.samples += 1;
        self.energy += energy;
        self.energy_sq += energy * energy;
        self.magnetization += magnetization;
        self.magnetization_sq += magnetization * magnetization;
    }

    /// Averages so far; all zero before the first sample.
    pub fn summary(&self) -> ObservableSummary {
        let c = self.samples.max(1) as f64;
        let energy = self.energy / c;
        ObservableSummary {
            samples: self.samples,
            energy,
            energy_variance: (self.energy_sq / c - energy * energy).max(0.0),
            magnetization: self.magnetization / c,
            magnetization_sq: self.magnetization_sq / c,
        }
    }
}
