//! Néel-Arrhenius kinetic Monte Carlo.
//!
//! Every cell switches at rate `ν_i = ν0·exp(−B_i / kT_i)` with the effective
//! barrier `B_i = max(ΔE_i, E_B,i + K_i + ΔE_i / 2)` floored at zero. Rates
//! are handled as logarithms so large barriers never overflow.

use rand::Rng;
use tracing::{trace, warn};

use super::{StepContext, StepOutcome};
use crate::error::{ensure_finite, SimResult};
use crate::parallel::map_cells;
use crate::partition::Partition;

#[derive(Debug, Clone)]
pub(crate) struct Neel {
    log_attempt_frequency: f64,
}

/// Effective switching barrier for switching energy `delta` [J].
#[inline]
pub fn effective_barrier(delta: f64, e_barrier: f64, anisotropy: f64) -> f64 {
    delta.max(e_barrier + anisotropy + 0.5 * delta).max(0.0)
}

impl Neel {
    pub fn new(attempt_frequency: f64) -> Self {
        Self {
            log_attempt_frequency: attempt_frequency.ln(),
        }
    }

    /// `ln ν_i`, or `−∞` for a cell at zero temperature.
    #[inline]
    fn log_rate(&self, ctx: &StepContext<'_>, i: usize) -> f64 {
        let kt = ctx.params.kt(i);
        if kt == 0.0 {
            return f64::NEG_INFINITY;
        }
        let delta = ctx
            .model
            .flip_delta(ctx.spins(), &ctx.params.anisotropy, i);
        if !delta.is_finite() {
            return f64::NAN;
        }
        let barrier = effective_barrier(delta, ctx.params.e_barrier[i], ctx.params.anisotropy[i]);
        self.log_attempt_frequency - barrier / kt
    }

    fn log_rates(&self, ctx: &StepContext<'_>) -> SimResult<Vec<f64>> {
        let rates = map_cells(ctx.n_cells(), ctx.sequential, |i| self.log_rate(ctx, i));
        for (i, &r) in rates.iter().enumerate() {
            if r != f64::NEG_INFINITY {
                ensure_finite(r, || format!("switching rate of cell {i}"))?;
            }
        }
        Ok(rates)
    }

    /// Draw a waiting time for every cell and switch the earliest one.
    pub fn single_step(&mut self, ctx: &mut StepContext<'_>) -> SimResult<StepOutcome> {
        let rates = self.log_rates(ctx)?;

        // τ_i = −ln(u_i) / ν_i, compared as ln τ_i
        let mut best: Option<(usize, f64)> = None;
        for (i, &log_rate) in rates.iter().enumerate() {
            let u = 1.0 - ctx.rng.gen::<f64>();
            if log_rate == f64::NEG_INFINITY {
                continue;
            }
            let log_tau = (-u.ln()).ln() - log_rate;
            if best.map_or(true, |(_, t)| log_tau < t) {
                best = Some((i, log_tau));
            }
        }

        let Some((i, log_tau)) = best else {
            warn!("every switching rate is zero, state is frozen");
            return Ok(StepOutcome::Frozen);
        };
        let tau = log_tau.exp();
        trace!(cell = i, tau, "néel switch");
        ctx.flip(i);
        ctx.state.time += tau;
        Ok(StepOutcome::Switched { flips: 1 })
    }

    /// Uniformized batch update over interaction-free classes.
    ///
    /// Class `k` fires at rate `ν̂_k = max ν_i` over its members, and a firing
    /// switches each member with probability `ν_i / ν̂_k`, so every cell still
    /// switches at its own `ν_i`. The clock advances by an exponential waiting
    /// time of total rate `Σ_k ν̂_k`.
    pub fn batch_step(
        &mut self,
        ctx: &mut StepContext<'_>,
        partition: &Partition,
    ) -> SimResult<StepOutcome> {
        let rates = self.log_rates(ctx)?;
        let bounds: Vec<f64> = (0..partition.len())
            .map(|k| {
                partition
                    .class(k)
                    .iter()
                    .map(|&i| rates[i])
                    .fold(f64::NEG_INFINITY, f64::max)
            })
            .collect();
        let top = bounds.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if top == f64::NEG_INFINITY {
            warn!("every switching rate is zero, state is frozen");
            return Ok(StepOutcome::Frozen);
        }

        // weights relative to the fastest class
        let weights: Vec<f64> = bounds.iter().map(|&b| (b - top).exp()).collect();
        let total: f64 = weights.iter().sum();
        let mut pick = ctx.rng.gen::<f64>() * total;
        let mut chosen = None;
        for (k, &w) in weights.iter().enumerate() {
            if w > 0.0 {
                chosen = Some(k);
                if pick < w {
                    break;
                }
                pick -= w;
            }
        }
        let Some(k) = chosen else {
            warn!("every switching rate is zero, state is frozen");
            return Ok(StepOutcome::Frozen);
        };

        // Δt = −ln(u) / Σ ν̂, evaluated in log space
        let u = 1.0 - ctx.rng.gen::<f64>();
        let window = ((-u.ln()).ln() - top - total.ln()).exp();

        let bound = bounds[k];
        let mut flips = 0;
        for &i in partition.class(k) {
            let p = (rates[i] - bound).exp();
            if ctx.rng.gen::<f64>() < p {
                ctx.flip(i);
                flips += 1;
            }
        }
        ctx.state.time += window;
        trace!(class = k, flips, window, "néel batch firing");
        Ok(StepOutcome::Switched { flips })
    }
}
