use crate::error::{SimError, SimResult};
use crate::geometry::Geometry;
use crate::params::CellField;

/// μ0 / 4π [T·m/A].
const MU0_OVER_4PI: f64 = 1e-7;

/// Strength and range of the point-dipole interaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dipolar {
    pub prefactor: f64,
    /// Coupling falls off as `1 / r^decay`.
    pub decay: f64,
}

impl Default for Dipolar {
    fn default() -> Self {
        Self {
            prefactor: 1.0,
            decay: 3.0,
        }
    }
}

/// Evaluates `J(i, j)` between occupied cells.
///
/// Every pair is evaluated with the lower index first and the displacement
/// pointing from the lower to the higher index, so `J(i, j)` and `J(j, i)`
/// are bitwise equal.
pub(crate) struct PairCoupling<'a> {
    geometry: &'a Geometry,
    moment: &'a CellField,
    dipolar: Dipolar,
}

impl<'a> PairCoupling<'a> {
    pub fn new(geometry: &'a Geometry, moment: &'a CellField, dipolar: Dipolar) -> Self {
        Self {
            geometry,
            moment,
            dipolar,
        }
    }

    /// Coupling for a pair at displacement `(rx, ry)` from `i` to `j`.
    pub fn at_offset(&self, i: usize, j: usize, rx: f64, ry: f64) -> f64 {
        if i < j {
            self.raw(i, j, rx, ry)
        } else {
            self.raw(j, i, -rx, -ry)
        }
    }

    /// Coupling from the direct displacement, plus the 8 nearest periodic
    /// images when the geometry has periodic boundaries.
    pub fn full(&self, i: usize, j: usize) -> f64 {
        if i == j {
            return 0.0;
        }
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        let (xl, yl) = self.geometry.position(lo);
        let (xh, yh) = self.geometry.position(hi);
        let (rx, ry) = (xh - xl, yh - yl);
        if !self.geometry.periodic {
            return self.raw(lo, hi, rx, ry);
        }
        let (lx, ly) = self.geometry.period();
        let mut total = 0.0;
        for kx in -1..=1 {
            for ky in -1..=1 {
                total += self.raw(lo, hi, rx + kx as f64 * lx, ry + ky as f64 * ly);
            }
        }
        total
    }

    #[inline]
    fn raw(&self, i: usize, j: usize, rx: f64, ry: f64) -> f64 {
        let r2 = rx * rx + ry * ry;
        if r2 == 0.0 {
            return 0.0;
        }
        let r = r2.sqrt();
        let scale = self.dipolar.prefactor * MU0_OVER_4PI * self.moment[i] * self.moment[j]
            / r.powf(self.dipolar.decay);
        match (self.geometry.orientation(i), self.geometry.orientation(j)) {
            (Some((oix, oiy)), Some((ojx, ojy))) => {
                let (ux, uy) = (rx / r, ry / r);
                let oi_u = oix * ux + oiy * uy;
                let oj_u = ojx * ux + ojy * uy;
                let oi_oj = oix * ojx + oiy * ojy;
                scale * (3.0 * oi_u * oj_u - oi_oj)
            }
            // parallel moments along z always repel side by side
            _ => -scale,
        }
    }
}

/// Approximate nearest-neighbour dipolar energy scale [J]: the largest `|J|`
/// over the lattice's nearest-neighbour offsets, for magnets that all carry
/// the mean moment. Direct displacements only, no periodic images.
pub fn nearest_neighbour_coupling(
    geometry: &Geometry,
    moment: &CellField,
    dipolar: Dipolar,
) -> SimResult<f64> {
    let Some(kind) = geometry.kind() else {
        return Err(SimError::Configuration(
            "nearest-neighbour interaction needs a catalog lattice".to_string(),
        ));
    };
    let n = geometry.n_cells();
    let mean = moment.as_slice().iter().sum::<f64>() / n as f64;
    let uniform = CellField::uniform("moment", n, mean)?;
    let pairs = PairCoupling::new(geometry, &uniform, dipolar);
    let mut largest = 0.0f64;
    for i in 0..n {
        for &(ox, oy) in kind.nearest_neighbours() {
            let Some(j) = geometry.neighbour_at(i, ox, oy) else {
                continue;
            };
            if j != i {
                let c = pairs.at_offset(i, j, ox as f64 * geometry.dx, oy as f64 * geometry.dy);
                largest = largest.max(c.abs());
            }
        }
    }
    Ok(largest)
}
