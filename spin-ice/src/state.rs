use rand::Rng;
use rand_xoshiro::Xoshiro256StarStar;

use crate::config::Pattern;
use crate::geometry::Geometry;

/// Binary magnetization of every occupied cell plus the simulation clocks.
///
/// Spins are `+1` or `−1` along the cell's easy axis (or along z for
/// out-of-plane lattices). Only the update engine writes to this struct.
#[derive(Debug, Clone, PartialEq)]
pub struct SpinState {
    pub(crate) spins: Vec<i8>,
    /// Physical time [s], advanced by the Néel scheme only.
    pub(crate) time: f64,
    /// Single-cell proposals made by the statistical schemes.
    pub(crate) attempts: u64,
    /// Accepted switches of any kind.
    pub(crate) switches: u64,
}

impl SpinState {
    pub(crate) fn from_pattern(
        geometry: &Geometry,
        pattern: Pattern,
        rng: &mut Xoshiro256StarStar,
    ) -> Self {
        Self {
            spins: pattern_spins(geometry, pattern, rng),
            time: 0.0,
            attempts: 0,
            switches: 0,
        }
    }

    #[inline]
    pub fn spins(&self) -> &[i8] {
        &self.spins
    }

    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Monte Carlo sweeps: proposals per cell.
    pub fn sweeps(&self) -> f64 {
        self.attempts as f64 / self.spins.len() as f64
    }

    pub fn switches(&self) -> u64 {
        self.switches
    }

    pub fn len(&self) -> usize {
        self.spins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spins.is_empty()
    }
}

pub(crate) fn pattern_spins(
    geometry: &Geometry,
    pattern: Pattern,
    rng: &mut Xoshiro256StarStar,
) -> Vec<i8> {
    let n = geometry.n_cells();
    match pattern {
        Pattern::Uniform => vec![1; n],
        Pattern::Random => (0..n)
            .map(|_| if rng.gen::<f64>() < 0.5 { -1 } else { 1 })
            .collect(),
        Pattern::Afm => match geometry.kind() {
            Some(kind) => geometry
                .cells()
                .iter()
                .map(|c| kind.afm_state(c.ix, c.iy))
                .collect(),
            // custom geometries: checkerboard on the grid
            None => geometry
                .cells()
                .iter()
                .map(|c| if (c.ix + c.iy) % 2 == 0 { 1 } else { -1 })
                .collect(),
        },
    }
}
