use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Switching algorithm driving [`Simulation::step`](crate::Simulation::step).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateScheme {
    /// Néel-Arrhenius kinetic Monte Carlo; advances the physical clock.
    Neel,
    /// Metropolis-Hastings single-flip sampling.
    Metropolis,
    /// Wolff cluster flips.
    Wolff,
}

impl TryFrom<&str> for UpdateScheme {
    type Error = String;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "neel" | "néel" => Ok(Self::Neel),
            "metropolis" => Ok(Self::Metropolis),
            "wolff" => Ok(Self::Wolff),
            _ => Err(format!(
                "unknown update scheme '{s}', expected 'neel', 'metropolis' or 'wolff'"
            )),
        }
    }
}

/// How much of the dipolar kernel is kept.
///
/// `Full` is exact but costs O(n²) memory and O(n) per field query.
/// `Truncated` keeps only pairs within a square window of `radius` grid cells
/// (larger radius: higher fidelity, higher cost). Under periodic boundaries the
/// window is clamped to half the grid; on an even axis the half-grid offset is
/// one pair reached two ways, and its coupling is the mean of both images.
/// `Threshold` evaluates every pair and then drops couplings weaker than
/// `min_magnitude`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelReduction {
    Full,
    Truncated { radius: usize },
    Threshold { min_magnitude: f64 },
}

impl TryFrom<&str> for KernelReduction {
    type Error = String;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "full" | "dense" => Ok(Self::Full),
            _ if s.starts_with("truncated") => {
                let radius: usize = s["truncated".len()..]
                    .trim_start_matches(':')
                    .parse()
                    .map_err(|_| {
                        format!("invalid radius in '{s}', expected 'truncatedN' with integer N >= 1")
                    })?;
                Ok(Self::Truncated { radius })
            }
            _ if s.starts_with("threshold") => {
                let min_magnitude: f64 = s["threshold".len()..]
                    .trim_start_matches(':')
                    .parse()
                    .map_err(|_| {
                        format!("invalid magnitude in '{s}', expected 'threshold:X' with X in joules")
                    })?;
                Ok(Self::Threshold { min_magnitude })
            }
            _ => Err(format!(
                "unknown kernel reduction '{s}', expected 'full', 'truncatedN' or 'threshold:X'"
            )),
        }
    }
}

/// Which cells an update step considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sampling {
    /// One cell per step.
    Single,
    /// One class of a greedy colouring of the coupling graph per step.
    Sublattice,
    /// One class of the `(ix mod spacing, iy mod spacing)` partition per step.
    /// Rejected at construction if two cells of a class are coupled.
    Grid { spacing: usize },
}

impl TryFrom<&str> for Sampling {
    type Error = String;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "single" => Ok(Self::Single),
            "sublattice" => Ok(Self::Sublattice),
            _ if s.starts_with("grid") => {
                let spacing: usize = s[4..].trim_start_matches(':').parse().map_err(|_| {
                    format!("invalid spacing in '{s}', expected 'gridN' with integer N >= 2")
                })?;
                Ok(Self::Grid { spacing })
            }
            _ => Err(format!(
                "unknown sampling '{s}', expected 'single', 'sublattice' or 'gridN'"
            )),
        }
    }
}

/// Initial magnetization pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    Uniform,
    Random,
    /// The antiferromagnetic arrangement of the lattice kind.
    Afm,
}

impl TryFrom<&str> for Pattern {
    type Error = String;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "uniform" => Ok(Self::Uniform),
            "random" => Ok(Self::Random),
            "afm" => Ok(Self::Afm),
            _ => Err(format!(
                "unknown pattern '{s}', expected 'uniform', 'random' or 'afm'"
            )),
        }
    }
}

fn validate_sim_config(cfg: &SimConfig) -> Result<(), ValidationError> {
    if !(cfg.attempt_frequency.is_finite() && cfg.attempt_frequency > 0.0) {
        return Err(ValidationError::new("attempt_frequency must be finite and > 0"));
    }
    if !(cfg.dipolar_prefactor.is_finite() && cfg.dipolar_prefactor >= 0.0) {
        return Err(ValidationError::new("dipolar_prefactor must be finite and >= 0"));
    }
    if !(cfg.dipolar_decay.is_finite() && cfg.dipolar_decay > 0.0) {
        return Err(ValidationError::new("dipolar_decay must be finite and > 0"));
    }
    if !cfg.angle.is_finite() {
        return Err(ValidationError::new("angle must be finite"));
    }
    if cfg.minimize_factor < 1 {
        return Err(ValidationError::new("minimize_factor must be >= 1"));
    }
    if !(0.0..=1.0).contains(&cfg.relax_tolerance) {
        return Err(ValidationError::new("relax_tolerance must lie in [0, 1]"));
    }
    if cfg.relax_max_rounds < 1 {
        return Err(ValidationError::new("relax_max_rounds must be >= 1"));
    }
    if !cfg.exchange.is_finite() {
        return Err(ValidationError::new("exchange must be finite"));
    }
    if cfg.field_refresh_interval < 1 {
        return Err(ValidationError::new("field_refresh_interval must be >= 1"));
    }
    match cfg.reduction {
        KernelReduction::Truncated { radius } if radius < 1 => {
            return Err(ValidationError::new("truncation radius must be >= 1"));
        }
        KernelReduction::Threshold { min_magnitude }
            if !(min_magnitude.is_finite() && min_magnitude >= 0.0) =>
        {
            return Err(ValidationError::new("threshold magnitude must be finite and >= 0"));
        }
        _ => {}
    }
    if let Sampling::Grid { spacing } = cfg.sampling {
        if spacing < 2 {
            return Err(ValidationError::new("grid sampling spacing must be >= 2"));
        }
    }
    Ok(())
}

/// Everything that is fixed when a simulation is constructed.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[validate(schema(function = "validate_sim_config"))]
#[serde(default)]
pub struct SimConfig {
    pub scheme: UpdateScheme,
    pub reduction: KernelReduction,
    pub sampling: Sampling,
    pub seed: u64,
    /// Periodic boundary conditions along both grid axes.
    pub periodic: bool,
    /// Initial state.
    pub pattern: Pattern,
    /// Extra rotation applied to every in-plane magnet [rad].
    pub angle: f64,
    /// Néel attempt frequency ν0 [Hz].
    pub attempt_frequency: f64,
    /// Relative strength of the dipolar interaction.
    pub dipolar_prefactor: f64,
    /// Dipolar coupling falls off as 1/r^decay.
    pub dipolar_decay: f64,
    /// Nearest-neighbour exchange J_ex [J], positive favours alignment.
    /// Needs a catalog lattice when non-zero.
    pub exchange: f64,
    /// `minimize()` gives up after `minimize_factor * n_cells` flips.
    pub minimize_factor: usize,
    /// Couplings weaker than `relax_tolerance * max|J|` are ignored when
    /// building the simultaneous-flip batches of `relax()`.
    pub relax_tolerance: f64,
    pub relax_max_rounds: usize,
    /// Recompute the cached local fields from scratch after this many flips.
    pub field_refresh_interval: usize,
    /// Evaluate per-cell work on the current thread instead of the rayon pool.
    pub sequential: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            scheme: UpdateScheme::Neel,
            reduction: KernelReduction::Full,
            sampling: Sampling::Single,
            seed: 42,
            periodic: false,
            pattern: Pattern::Random,
            angle: 0.0,
            attempt_frequency: 1e10,
            dipolar_prefactor: 1.0,
            dipolar_decay: 3.0,
            exchange: 0.0,
            minimize_factor: 10,
            relax_tolerance: 1e-2,
            relax_max_rounds: 10_000,
            field_refresh_interval: 10_000,
            sequential: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identifiers() {
        assert_eq!(UpdateScheme::try_from("wolff"), Ok(UpdateScheme::Wolff));
        assert!(UpdateScheme::try_from("glauber").is_err());

        assert_eq!(
            KernelReduction::try_from("truncated4"),
            Ok(KernelReduction::Truncated { radius: 4 })
        );
        assert_eq!(
            KernelReduction::try_from("truncated:2"),
            Ok(KernelReduction::Truncated { radius: 2 })
        );
        assert_eq!(
            KernelReduction::try_from("threshold:1e-24"),
            Ok(KernelReduction::Threshold {
                min_magnitude: 1e-24
            })
        );
        assert!(KernelReduction::try_from("truncatedX").is_err());

        assert_eq!(Sampling::try_from("grid3"), Ok(Sampling::Grid { spacing: 3 }));
        assert_eq!(Sampling::try_from("sublattice"), Ok(Sampling::Sublattice));
        assert!(Sampling::try_from("checkerboard").is_err());
        assert!(Pattern::try_from("vortex").is_err());
    }

    #[test]
    fn test_validation() {
        assert!(SimConfig::default().validate().is_ok());

        let cfg = SimConfig {
            sampling: Sampling::Grid { spacing: 1 },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = SimConfig {
            reduction: KernelReduction::Truncated { radius: 0 },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = SimConfig {
            attempt_frequency: f64::NAN,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = SimConfig {
            relax_tolerance: 1.5,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = SimConfig {
            exchange: f64::INFINITY,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_serde_defaults() {
        let cfg: SimConfig =
            serde_json::from_str(r#"{"scheme":"metropolis","seed":7}"#).unwrap();
        assert_eq!(cfg.scheme, UpdateScheme::Metropolis);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.reduction, KernelReduction::Full);
    }
}
