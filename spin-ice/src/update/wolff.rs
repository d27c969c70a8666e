//! Wolff cluster updates on the coupling graph.

use rand::Rng;
use tracing::{trace, warn};

use super::metropolis::accept;
use super::{StepContext, StepOutcome};
use crate::error::{ensure_finite, SimResult};
use crate::kernel::CouplingKernel;

/// Scratch buffers reused across steps.
#[derive(Debug, Clone)]
pub(crate) struct Wolff {
    in_cluster: Vec<bool>,
    stack: Vec<usize>,
    members: Vec<usize>,
}

/// Grow a BFS cluster from `seed` over the non-zero couplings of `kernel`.
/// `should_add(site, neighbor, coupling)` decides whether to add each
/// not-yet-visited neighbor.
/// Caller owns buffers: `in_cluster` must be all-false, `stack` and `members`
/// must be empty.
#[inline]
fn bfs_cluster(
    kernel: &dyn CouplingKernel,
    seed: usize,
    in_cluster: &mut [bool],
    stack: &mut Vec<usize>,
    members: &mut Vec<usize>,
    mut should_add: impl FnMut(usize, usize, f64) -> bool,
) {
    in_cluster[seed] = true;
    stack.push(seed);
    members.push(seed);

    while let Some(site) = stack.pop() {
        kernel.for_each_coupling(site, &mut |nb, c| {
            if !in_cluster[nb] && should_add(site, nb, c) {
                in_cluster[nb] = true;
                stack.push(nb);
                members.push(nb);
            }
        });
    }
}

impl Wolff {
    pub fn new(n_cells: usize) -> Self {
        Self {
            in_cluster: vec![false; n_cells],
            stack: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn step(&mut self, ctx: &mut StepContext<'_>) -> SimResult<StepOutcome> {
        if ctx.params.all_frozen() {
            warn!("every cell is at zero temperature, state is frozen");
            return Ok(StepOutcome::Frozen);
        }
        let n = ctx.n_cells();
        if self.in_cluster.len() != n {
            self.in_cluster = vec![false; n];
        }
        self.stack.clear();
        self.members.clear();
        let seed = ctx.rng.gen_range(0..n);
        let kt = ctx.params.kt(seed);
        if kt == 0.0 {
            ctx.state.attempts += 1;
            return Ok(StepOutcome::Rejected);
        }

        // a bond J·s_i·s_j > 0 is satisfied; it joins with 1 − exp(−2·J·s_i·s_j / kT)
        {
            let spins = &ctx.state.spins;
            let rng = &mut *ctx.rng;
            bfs_cluster(
                ctx.model.kernel(),
                seed,
                &mut self.in_cluster,
                &mut self.stack,
                &mut self.members,
                |site, nb, c| {
                    let bond = c * (spins[site] * spins[nb]) as f64;
                    bond > 0.0 && rng.gen::<f64>() < -(-2.0 * bond / kt).exp_m1()
                },
            );
        }
        for &i in &self.members {
            self.in_cluster[i] = false;
        }
        self.members.sort_unstable();
        ctx.state.attempts += self.members.len() as u64;

        let zeeman = ctx.model.zeeman();
        let delta: f64 = self
            .members
            .iter()
            .map(|&i| 2.0 * ctx.state.spins[i] as f64 * zeeman[i])
            .sum();
        let delta = ensure_finite(delta, || "cluster Zeeman energy".to_string())?;

        let outcome = if accept(ctx.rng, delta, kt) {
            for &i in &self.members {
                ctx.flip(i);
            }
            StepOutcome::Switched {
                flips: self.members.len(),
            }
        } else {
            StepOutcome::Rejected
        };
        trace!(seed, size = self.members.len(), ?outcome, "wolff cluster");
        Ok(outcome)
    }
}
