//! Process-wide numeric backend.
//!
//! The backend is chosen once, before any [`Simulation`](crate::Simulation)
//! exists, and never changes for the lifetime of the process. Independent
//! simulations that need different backends must run in separate processes.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{SimError, SimResult};

/// Environment variable consulted when no explicit directive is given.
pub const BACKEND_ENV: &str = "ASI_BACKEND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Host arrays; per-cell work is spread over the rayon pool.
    Cpu,
    /// Device-resident arrays.
    Accelerator,
}

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Accelerator => "accelerator",
        }
    }

    /// Whether this backend can be used by the current build.
    pub fn is_available(self) -> bool {
        match self {
            Self::Cpu => true,
            // No device runtime is linked into this build.
            Self::Accelerator => false,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = SimError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "accelerator" | "gpu" | "cuda" => Ok(Self::Accelerator),
            other => Err(SimError::Configuration(format!(
                "unknown backend '{other}', expected 'cpu' or 'accelerator'"
            ))),
        }
    }
}

/// Pick the backend from an explicit directive, else the environment value,
/// else the CPU default. Blank values count as absent.
pub fn choose(directive: Option<&str>, env_value: Option<&str>) -> SimResult<Backend> {
    fn given(v: Option<&str>) -> Option<&str> {
        v.map(str::trim).filter(|s| !s.is_empty())
    }
    match given(directive).or(given(env_value)) {
        Some(s) => s.parse(),
        None => Ok(Backend::Cpu),
    }
}

/// A write-once backend cell.
pub struct BackendSlot(OnceLock<Backend>);

impl BackendSlot {
    pub const fn new() -> Self {
        Self(OnceLock::new())
    }

    /// Install `backend`. Fails if it is unavailable or if the slot is
    /// already initialised, whatever the previous value.
    pub fn init(&self, backend: Backend) -> SimResult<Backend> {
        if !backend.is_available() {
            return Err(SimError::BackendUnavailable(format!(
                "'{backend}' backend requested but no accelerator runtime is available in this build"
            )));
        }
        self.0.set(backend).map_err(|_| SimError::BackendConflict {
            current: self.0.get().map_or("?", |b| b.name()).to_string(),
            requested: backend.name().to_string(),
        })?;
        Ok(backend)
    }

    pub fn get(&self) -> Option<Backend> {
        self.0.get().copied()
    }

    /// Return the installed backend, resolving it from `env_value` on first use.
    pub fn get_or_resolve(&self, env_value: Option<&str>) -> SimResult<Backend> {
        if let Some(b) = self.get() {
            return Ok(b);
        }
        let wanted = choose(None, env_value)?;
        match self.init(wanted) {
            Ok(b) => Ok(b),
            // Lost a race against another initialiser: take what it installed.
            Err(SimError::BackendConflict { .. }) => Ok(self.get().unwrap_or(wanted)),
            Err(e) => Err(e),
        }
    }
}

impl Default for BackendSlot {
    fn default() -> Self {
        Self::new()
    }
}

static PROCESS_BACKEND: BackendSlot = BackendSlot::new();

/// Resolve and install the process backend. Call once at startup, before
/// constructing any simulation.
pub fn resolve(directive: Option<&str>) -> SimResult<Backend> {
    let env_value = std::env::var(BACKEND_ENV).ok();
    let backend = choose(directive, env_value.as_deref())?;
    let backend = PROCESS_BACKEND.init(backend)?;
    info!(backend = %backend, "compute backend selected");
    Ok(backend)
}

/// The process backend, lazily resolved from the environment if nobody
/// called [`resolve`] first.
pub fn current() -> SimResult<Backend> {
    let env_value = std::env::var(BACKEND_ENV).ok();
    PROCESS_BACKEND.get_or_resolve(env_value.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_wins_over_env() {
        assert_eq!(choose(Some("cpu"), Some("gpu")).unwrap(), Backend::Cpu);
        assert_eq!(
            choose(None, Some("accelerator")).unwrap(),
            Backend::Accelerator
        );
        assert_eq!(choose(None, None).unwrap(), Backend::Cpu);
        assert_eq!(choose(Some(""), None).unwrap(), Backend::Cpu);
    }

    #[test]
    fn test_blank_directive_falls_back_to_env() {
        assert_eq!(
            choose(Some(""), Some("accelerator")).unwrap(),
            Backend::Accelerator
        );
        assert_eq!(choose(Some("  "), Some("cpu")).unwrap(), Backend::Cpu);
        assert_eq!(choose(Some(" "), Some(" ")).unwrap(), Backend::Cpu);
        assert!(choose(Some(""), Some("tpu")).is_err());
        assert!(matches!(
            choose(Some("tpu"), None),
            Err(SimError::Configuration(_))
        ));
    }

    #[test]
    fn test_slot_is_write_once() {
        let slot = BackendSlot::new();
        assert_eq!(slot.get(), None);
        assert_eq!(slot.init(Backend::Cpu).unwrap(), Backend::Cpu);
        assert!(matches!(
            slot.init(Backend::Cpu),
            Err(SimError::BackendConflict { .. })
        ));
        assert_eq!(slot.get(), Some(Backend::Cpu));
    }

    #[test]
    fn test_accelerator_fails_fast() {
        let slot = BackendSlot::new();
        assert!(matches!(
            slot.init(Backend::Accelerator),
            Err(SimError::BackendUnavailable(_))
        ));
        // No implicit fallback was installed.
        assert_eq!(slot.get(), None);
        assert!(matches!(
            slot.get_or_resolve(Some("gpu")),
            Err(SimError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn test_lazy_resolution_sticks() {
        let slot = BackendSlot::new();
        assert_eq!(slot.get_or_resolve(None).unwrap(), Backend::Cpu);
        assert_eq!(slot.get_or_resolve(Some("gpu")).unwrap(), Backend::Cpu);
    }
}
