use std::fmt;

use thiserror::Error;

/// Errors raised by the simulation engine.
#[derive(Error, Debug)]
pub enum SimError {
    /// Invalid geometry, parameter field or configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// NaN or Inf detected in an energy evaluation.
    #[error("numeric instability: {0}")]
    NumericInstability(String),

    /// The requested compute backend cannot be used in this process.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The process backend was already chosen.
    #[error("backend already initialised as '{current}', refusing to switch to '{requested}'")]
    BackendConflict { current: String, requested: String },

    /// A relaxation loop ran out of budget. Recoverable: the simulation is
    /// left in the best state found, which is also carried here.
    #[error("{0}")]
    NotConverged(ConvergenceWarning),
}

pub type SimResult<T> = Result<T, SimError>;

impl From<validator::ValidationErrors> for SimError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::Configuration(e.to_string())
    }
}

/// Outcome of a relaxation loop that hit its iteration or time budget.
#[derive(Debug, Clone)]
pub struct ConvergenceWarning {
    /// Which procedure gave up (`"relax"` or `"minimize"`).
    pub procedure: &'static str,
    /// Rounds (relax) or flips (minimize) performed.
    pub iterations: usize,
    /// Total energy of `best_state` [J].
    pub best_energy: f64,
    pub best_state: Vec<i8>,
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} did not converge within {} iterations (best energy {:.6e} J)",
            self.procedure, self.iterations, self.best_energy
        )
    }
}

/// Turn a non-finite value into a [`SimError::NumericInstability`].
#[inline]
pub(crate) fn ensure_finite(value: f64, what: impl FnOnce() -> String) -> SimResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SimError::NumericInstability(format!("{} = {value}", what())))
    }
}
