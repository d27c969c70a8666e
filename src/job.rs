use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use spin_ice::{
    EnergyBreakdown, Extent, ExternalField, GeometryKind, Magnetization, ParamsConfig,
    RelaxReport, SimConfig,
};

use crate::stats::ObservableSummary;

/// Everything a worker needs to run one simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub kind: GeometryKind,
    pub a: f64,
    pub extent: Extent,
    pub config: SimConfig,
    pub params: ParamsConfig,
    pub field: ExternalField,
    pub steps: usize,
    pub record_every: usize,
    pub relax: bool,
    pub minimize: bool,
}

impl JobSpec {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading job file {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing job file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).with_context(|| format!("writing job file {}", path.display()))
    }
}

/// Outcome of a relax or minimize pass.
#[derive(Debug, Clone, Serialize)]
pub struct DescentResult {
    pub procedure: &'static str,
    pub converged: bool,
    pub iterations: usize,
    pub energy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RelaxReport>,
}

/// Summary written by `run` and by each sweep worker.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub n_cells: usize,
    pub steps: usize,
    pub flips: usize,
    pub frozen: bool,
    /// Physical time [s] (Néel scheme).
    pub time: f64,
    pub sweeps: f64,
    pub energy: EnergyBreakdown,
    pub magnetization: Magnetization,
    pub observables: ObservableSummary,
    pub descent: Vec<DescentResult>,
    pub spins: Vec<i8>,
}

impl JobResult {
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).with_context(|| format!("writing result file {}", path.display()))
    }
}
