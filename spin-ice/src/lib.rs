//! Thermally driven switching dynamics of artificial spin ice.
//!
//! Every occupied cell of a 2D grid holds one nanomagnet with a pinned axis
//! and a binary state. Cells interact through the point-dipole coupling and
//! switch under Néel-Arrhenius kinetics, Metropolis sampling or Wolff cluster
//! moves; `relax` and `minimize` drive the state to a local energy minimum.

pub mod backend;
pub mod config;
pub mod energy;
pub mod error;
pub mod geometry;
pub mod kernel;
pub mod params;
pub mod partition;
pub mod relax;
pub mod simulation;
pub mod state;
pub mod update;

mod parallel;

pub use backend::Backend;
pub use config::{KernelReduction, Pattern, Sampling, SimConfig, UpdateScheme};
pub use energy::EnergyBreakdown;
pub use error::{ConvergenceWarning, SimError, SimResult};
pub use geometry::{Extent, Geometry, GeometryKind};
pub use kernel::CouplingKernel;
pub use params::{ExternalField, ParamValues, Parameters, ParamsConfig, K_B};
pub use relax::{Budget, Progress, RelaxReport};
pub use simulation::{Magnetization, Simulation, Snapshot, StepSummary};
pub use update::StepOutcome;
