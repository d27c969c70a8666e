//! Deterministic energy descent: batched `relax` and sequential `minimize`.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ConvergenceWarning, SimError, SimResult};
use crate::partition::Partition;
use crate::update::StepContext;

/// Caller limits on a relaxation loop. `None` means unbounded (the loop's
/// own cap still applies).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Budget {
    pub max_iterations: Option<usize>,
    pub max_duration: Option<Duration>,
}

impl Budget {
    pub fn iterations(n: usize) -> Self {
        Self {
            max_iterations: Some(n),
            max_duration: None,
        }
    }

    pub fn duration(d: Duration) -> Self {
        Self {
            max_iterations: None,
            max_duration: Some(d),
        }
    }

    fn cap(&self, own: usize) -> usize {
        self.max_iterations.map_or(own, |m| m.min(own))
    }

    fn expired(&self, start: Instant) -> bool {
        self.max_duration.is_some_and(|d| start.elapsed() >= d)
    }
}

/// Passed to the progress callback after every relax round or minimize flip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    /// 1-based round (relax) or flip (minimize) number.
    pub iteration: usize,
    /// Cells switched in this iteration.
    pub flips: usize,
    /// Total energy after this iteration [J].
    pub energy: f64,
}

/// Summary of a converged relaxation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RelaxReport {
    pub iterations: usize,
    pub flips: usize,
    pub energy: f64,
}

fn not_converged(
    ctx: &mut StepContext<'_>,
    procedure: &'static str,
    iterations: usize,
    best_energy: f64,
    best_state: Vec<i8>,
) -> SimError {
    ctx.restore(&best_state);
    let warning = ConvergenceWarning {
        procedure,
        iterations,
        best_energy,
        best_state,
    };
    warn!(%warning, "restored best state");
    SimError::NotConverged(warning)
}

/// Flip, class by class, every cell whose switch lowers the energy, until a
/// whole round changes nothing.
///
/// Members of a class are decided on the fields before any of them flips.
/// Couplings below the partition's colouring threshold are ignored within a
/// round, so the energy may occasionally rise; the best state seen is kept
/// for the non-converged case.
#[cfg_attr(feature = "profile", inline(never))]
pub(crate) fn relax(
    ctx: &mut StepContext<'_>,
    partition: &Partition,
    max_rounds: usize,
    budget: Budget,
    on_round: &mut dyn FnMut(&Progress),
) -> SimResult<RelaxReport> {
    let start = Instant::now();
    let cap = budget.cap(max_rounds);
    let params = ctx.params;
    let anisotropy = &params.anisotropy;
    let mut best_energy = ctx.model.total_energy(&ctx.state.spins, anisotropy)?;
    let mut best_state = ctx.state.spins.clone();
    let mut total_flips = 0;

    for round in 1..=cap {
        if budget.expired(start) {
            return Err(not_converged(ctx, "relax", round - 1, best_energy, best_state));
        }
        let mut flips = 0;
        for class in partition.classes() {
            let deltas = ctx
                .model
                .flip_deltas(&ctx.state.spins, anisotropy, class)?;
            for (&i, &delta) in class.iter().zip(&deltas) {
                if delta < 0.0 {
                    ctx.flip(i);
                    flips += 1;
                }
            }
        }
        total_flips += flips;
        ctx.model.refresh(&ctx.state.spins);
        let energy = ctx.model.total_energy(&ctx.state.spins, anisotropy)?;
        on_round(&Progress {
            iteration: round,
            flips,
            energy,
        });
        debug!(round, flips, energy, "relax round");

        if energy < best_energy {
            best_energy = energy;
            best_state.clone_from(&ctx.state.spins);
        }
        if flips == 0 {
            return Ok(RelaxReport {
                iterations: round,
                flips: total_flips,
                energy,
            });
        }
    }
    Err(not_converged(ctx, "relax", cap, best_energy, best_state))
}

/// Strict steepest descent: switch the single cell with the most negative
/// switching energy (lowest index on ties) until none lowers the energy.
///
/// The energy decreases with every flip, so the current state is always the
/// best one seen.
#[cfg_attr(feature = "profile", inline(never))]
pub(crate) fn minimize(
    ctx: &mut StepContext<'_>,
    max_flips: usize,
    budget: Budget,
    on_flip: &mut dyn FnMut(&Progress),
) -> SimResult<RelaxReport> {
    let start = Instant::now();
    let cap = budget.cap(max_flips);
    let params = ctx.params;
    let anisotropy = &params.anisotropy;
    let mut energy = ctx.model.total_energy(&ctx.state.spins, anisotropy)?;

    let mut flip = 0;
    loop {
        let deltas = ctx.model.all_flip_deltas(&ctx.state.spins, anisotropy)?;
        let (cell, delta) = deltas
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::INFINITY), |best, (i, d)| if d < best.1 { (i, d) } else { best });
        if delta >= 0.0 {
            debug!(flips = flip, energy, "minimize converged");
            return Ok(RelaxReport {
                iterations: flip,
                flips: flip,
                energy,
            });
        }
        if flip == cap || budget.expired(start) {
            let best_state = ctx.state.spins.clone();
            return Err(not_converged(ctx, "minimize", flip, energy, best_state));
        }
        ctx.flip(cell);
        energy += delta;
        flip += 1;
        on_flip(&Progress {
            iteration: flip,
            flips: 1,
            energy,
        });
    }
}
