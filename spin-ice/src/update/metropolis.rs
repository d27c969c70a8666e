//! Metropolis-Hastings single-flip sampling.

use rand::Rng;
use rand_xoshiro::Xoshiro256StarStar;

use super::{StepContext, StepOutcome};
use crate::error::SimResult;
use crate::partition::Partition;

/// Accept a move costing `delta` at thermal energy `kt` with probability
/// `min(1, exp(−delta / kt))`. At `kt = 0` only non-increasing moves pass.
#[inline]
pub(crate) fn accept(rng: &mut Xoshiro256StarStar, delta: f64, kt: f64) -> bool {
    // u in (0, 1]
    let u = 1.0 - rng.gen::<f64>();
    if kt == 0.0 {
        return delta <= 0.0;
    }
    delta <= -kt * u.ln()
}

pub(crate) fn single_step(ctx: &mut StepContext<'_>) -> SimResult<StepOutcome> {
    let i = ctx.rng.gen_range(0..ctx.n_cells());
    ctx.state.attempts += 1;
    let delta = ctx
        .model
        .checked_flip_delta(ctx.spins(), &ctx.params.anisotropy, i)?;
    if accept(ctx.rng, delta, ctx.params.kt(i)) {
        ctx.flip(i);
        Ok(StepOutcome::Switched { flips: 1 })
    } else {
        Ok(StepOutcome::Rejected)
    }
}

/// Evaluate every member of one uniformly chosen class. Members are not
/// coupled, so their switching energies are independent of each other.
pub(crate) fn batch_step(
    ctx: &mut StepContext<'_>,
    partition: &Partition,
) -> SimResult<StepOutcome> {
    let class = partition.class(ctx.rng.gen_range(0..partition.len()));
    ctx.state.attempts += class.len() as u64;
    let deltas = ctx
        .model
        .flip_deltas(ctx.spins(), &ctx.params.anisotropy, class)?;

    let mut flips = 0;
    for (&i, &delta) in class.iter().zip(&deltas) {
        if accept(ctx.rng, delta, ctx.params.kt(i)) {
            ctx.flip(i);
            flips += 1;
        }
    }
    if flips == 0 {
        Ok(StepOutcome::Rejected)
    } else {
        Ok(StepOutcome::Switched { flips })
    }
}
