use serde::Serialize;
use tracing::debug;

use crate::error::{ensure_finite, SimResult};
use crate::geometry::Geometry;
use crate::kernel::{CouplingKernel, SparseKernel};
use crate::params::{CellField, ExternalField};
use crate::parallel::{map_cells, sum_cells};

/// Energy of a uniaxial magnet in state `s` along its pinned easy axis [J].
#[inline]
fn anisotropy_energy(k: f64, s: i8) -> f64 {
    -k * (s as f64 * s as f64)
}

/// Anisotropy change when cell `i` switches. Both states lie on the easy
/// axis, so this is zero; the barrier contribution of `K` enters the Néel
/// rates instead.
#[inline]
pub(crate) fn anisotropy_flip_delta(k: f64, s: i8) -> f64 {
    anisotropy_energy(k, -s) - anisotropy_energy(k, s)
}

/// Zeeman factor `μ_i·(B_i·o_i)` of every cell [J].
pub fn zeeman_factors(geometry: &Geometry, moment: &CellField, field: &ExternalField) -> Vec<f64> {
    (0..geometry.n_cells())
        .map(|i| moment[i] * field.projection(geometry, i))
        .collect()
}

/// Energy split by contribution [J].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergyBreakdown {
    pub dipolar: f64,
    pub exchange: f64,
    pub zeeman: f64,
    pub anisotropy: f64,
    pub total: f64,
}

/// Coupling kernel, Zeeman factors and the cached coupling fields
/// `Σ_j J(i, j)·s_j` of the current state.
///
/// The kernel already contains any nearest-neighbour exchange; `exchange`
/// keeps those couplings on their own so the energy can be split.
///
/// The cache is patched on every switch and recomputed from the kernel every
/// `refresh_interval` switches to keep round-off from accumulating.
#[derive(Debug)]
pub struct InteractionModel {
    kernel: Box<dyn CouplingKernel>,
    exchange: Option<SparseKernel>,
    zeeman: Vec<f64>,
    dipolar: Vec<f64>,
    since_refresh: usize,
    refresh_interval: usize,
    sequential: bool,
}

impl InteractionModel {
    pub fn new(
        kernel: Box<dyn CouplingKernel>,
        exchange: Option<SparseKernel>,
        zeeman: Vec<f64>,
        spins: &[i8],
        refresh_interval: usize,
        sequential: bool,
    ) -> Self {
        let mut model = Self {
            kernel,
            exchange,
            zeeman,
            dipolar: Vec::new(),
            since_refresh: 0,
            refresh_interval: refresh_interval.max(1),
            sequential,
        };
        model.refresh(spins);
        model
    }

    pub fn kernel(&self) -> &dyn CouplingKernel {
        self.kernel.as_ref()
    }

    pub fn exchange(&self) -> Option<&SparseKernel> {
        self.exchange.as_ref()
    }

    pub fn replace_kernel(
        &mut self,
        kernel: Box<dyn CouplingKernel>,
        exchange: Option<SparseKernel>,
        spins: &[i8],
    ) {
        self.kernel = kernel;
        self.exchange = exchange;
        self.refresh(spins);
    }

    pub fn zeeman(&self) -> &[f64] {
        &self.zeeman
    }

    pub fn set_zeeman(&mut self, zeeman: Vec<f64>) {
        self.zeeman = zeeman;
    }

    /// Recompute the coupling field cache from the kernel.
    pub fn refresh(&mut self, spins: &[i8]) {
        let kernel = self.kernel.as_ref();
        self.dipolar = map_cells(spins.len(), self.sequential, |i| kernel.field(i, spins));
        self.since_refresh = 0;
    }

    /// `h_i = Σ_j J(i, j)·s_j + μ_i·(B_i·o_i)`, unchecked.
    #[inline]
    pub fn field(&self, i: usize) -> f64 {
        self.dipolar[i] + self.zeeman[i]
    }

    /// Energy change if cell `i` switched, unchecked.
    #[inline]
    pub fn flip_delta(&self, spins: &[i8], anisotropy: &CellField, i: usize) -> f64 {
        let s = spins[i];
        2.0 * s as f64 * self.field(i) + anisotropy_flip_delta(anisotropy[i], s)
    }

    /// Checked [`flip_delta`](Self::flip_delta).
    pub fn checked_flip_delta(
        &self,
        spins: &[i8],
        anisotropy: &CellField,
        i: usize,
    ) -> SimResult<f64> {
        ensure_finite(self.flip_delta(spins, anisotropy, i), || {
            format!("switching energy of cell {i}")
        })
    }

    /// Switching energies of `cells`, evaluated in parallel.
    pub fn flip_deltas(
        &self,
        spins: &[i8],
        anisotropy: &CellField,
        cells: &[usize],
    ) -> SimResult<Vec<f64>> {
        let deltas = map_cells(cells.len(), self.sequential, |k| {
            self.flip_delta(spins, anisotropy, cells[k])
        });
        for (k, &d) in deltas.iter().enumerate() {
            ensure_finite(d, || format!("switching energy of cell {}", cells[k]))?;
        }
        Ok(deltas)
    }

    /// Switching energies of every cell.
    pub fn all_flip_deltas(&self, spins: &[i8], anisotropy: &CellField) -> SimResult<Vec<f64>> {
        let deltas = map_cells(spins.len(), self.sequential, |i| {
            self.flip_delta(spins, anisotropy, i)
        });
        for (i, &d) in deltas.iter().enumerate() {
            ensure_finite(d, || format!("switching energy of cell {i}"))?;
        }
        Ok(deltas)
    }

    /// Negate `spins[i]` and patch the field cache.
    ///
    /// Spins only change through this and [`assign`](Self::assign).
    pub(crate) fn flip(&mut self, spins: &mut [i8], i: usize) {
        spins[i] = -spins[i];
        let change = 2.0 * spins[i] as f64;
        let dipolar = &mut self.dipolar;
        self.kernel
            .for_each_coupling(i, &mut |j, c| dipolar[j] += c * change);
        self.since_refresh += 1;
        if self.since_refresh >= self.refresh_interval {
            debug!(flips = self.since_refresh, "refreshing local field cache");
            self.refresh(spins);
        }
    }

    /// Overwrite every spin with `values` and rebuild the field cache.
    pub(crate) fn assign(&mut self, spins: &mut [i8], values: &[i8]) {
        spins.copy_from_slice(values);
        self.refresh(spins);
    }

    /// Exact local field of cell `i`, recomputed from the kernel.
    pub fn local_field(&self, spins: &[i8], i: usize) -> SimResult<f64> {
        ensure_finite(self.kernel.field(i, spins) + self.zeeman[i], || {
            format!("local field of cell {i}")
        })
    }

    /// Energy components of `spins`, evaluated exactly from the kernel.
    pub fn energy_breakdown(
        &self,
        spins: &[i8],
        anisotropy: &CellField,
    ) -> SimResult<EnergyBreakdown> {
        let n = spins.len();
        let kernel = self.kernel.as_ref();
        let coupled = -0.5
            * sum_cells(n, self.sequential, |i| {
                spins[i] as f64 * kernel.field(i, spins)
            });
        let exchange = self.exchange.as_ref().map_or(0.0, |ex| {
            -0.5 * sum_cells(n, self.sequential, |i| spins[i] as f64 * ex.field(i, spins))
        });
        let dipolar = coupled - exchange;
        let zeeman = -(0..n)
            .map(|i| spins[i] as f64 * self.zeeman[i])
            .sum::<f64>();
        let anisotropy = (0..n)
            .map(|i| anisotropy_energy(anisotropy[i], spins[i]))
            .sum::<f64>();
        let total = ensure_finite(coupled + zeeman + anisotropy, || "total energy".to_string())?;
        Ok(EnergyBreakdown {
            dipolar,
            exchange,
            zeeman,
            anisotropy,
            total,
        })
    }

    pub fn total_energy(&self, spins: &[i8], anisotropy: &CellField) -> SimResult<f64> {
        Ok(self.energy_breakdown(spins, anisotropy)?.total)
    }
}
