//! Switching algorithms.
//!
//! Each scheme advances the [`SpinState`] through [`StepContext::flip`].
//! Together with [`StepContext::restore`] it is the only way spins change, so
//! the local field cache stays consistent.

pub mod metropolis;
pub mod neel;
pub mod wolff;

use rand_xoshiro::Xoshiro256StarStar;
use serde::Serialize;

use crate::config::UpdateScheme;
use crate::energy::InteractionModel;
use crate::error::SimResult;
use crate::params::Parameters;
use crate::partition::Partition;
use crate::state::SpinState;

/// What a single update step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "outcome")]
pub enum StepOutcome {
    /// `flips` cells switched (may be zero for a batch window where no
    /// member fired).
    Switched { flips: usize },
    /// The proposal was rejected; nothing changed.
    Rejected,
    /// No cell can switch (every rate is zero). State and clock unchanged.
    Frozen,
}

impl StepOutcome {
    pub fn flips(&self) -> usize {
        match self {
            Self::Switched { flips } => *flips,
            _ => 0,
        }
    }
}

/// Mutable view of everything a step touches.
pub(crate) struct StepContext<'a> {
    pub params: &'a Parameters,
    pub model: &'a mut InteractionModel,
    pub state: &'a mut SpinState,
    pub rng: &'a mut Xoshiro256StarStar,
    /// Present for batch sampling.
    pub partition: Option<&'a Partition>,
    pub sequential: bool,
}

impl StepContext<'_> {
    /// Switch cell `i`.
    #[inline]
    pub fn flip(&mut self, i: usize) {
        self.model.flip(&mut self.state.spins, i);
        self.state.switches += 1;
    }

    /// Overwrite the state with `values`, refreshing the field cache when
    /// anything changed. The switch counter is left alone.
    pub fn restore(&mut self, values: &[i8]) {
        if self.state.spins != values {
            self.model.assign(&mut self.state.spins, values);
        }
    }

    #[inline]
    pub fn spins(&self) -> &[i8] {
        &self.state.spins
    }

    pub fn n_cells(&self) -> usize {
        self.state.spins.len()
    }
}

/// The update scheme chosen at construction, with its scratch buffers.
#[derive(Debug, Clone)]
pub(crate) enum Updater {
    Neel(neel::Neel),
    Metropolis,
    Wolff(wolff::Wolff),
}

impl Updater {
    pub fn new(scheme: UpdateScheme, attempt_frequency: f64, n_cells: usize) -> Self {
        match scheme {
            UpdateScheme::Neel => Self::Neel(neel::Neel::new(attempt_frequency)),
            UpdateScheme::Metropolis => Self::Metropolis,
            UpdateScheme::Wolff => Self::Wolff(wolff::Wolff::new(n_cells)),
        }
    }

    pub fn scheme(&self) -> UpdateScheme {
        match self {
            Self::Neel(_) => UpdateScheme::Neel,
            Self::Metropolis => UpdateScheme::Metropolis,
            Self::Wolff(_) => UpdateScheme::Wolff,
        }
    }

    #[cfg_attr(feature = "profile", inline(never))]
    pub fn step(&mut self, ctx: &mut StepContext<'_>) -> SimResult<StepOutcome> {
        match self {
            Self::Neel(neel) => match ctx.partition {
                Some(partition) => neel.batch_step(ctx, partition),
                None => neel.single_step(ctx),
            },
            Self::Metropolis => match ctx.partition {
                Some(partition) => metropolis::batch_step(ctx, partition),
                None => metropolis::single_step(ctx),
            },
            Self::Wolff(wolff) => wolff.step(ctx),
        }
    }
}
