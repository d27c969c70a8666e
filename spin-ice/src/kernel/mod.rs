//! Pairwise couplings between occupied cells.
//!
//! The kernel stores `J(i, j)` such that the pair energy is `−J·s_i·s_j`:
//! positive couplings favour alignment. It holds the dipolar interaction plus
//! any nearest-neighbour exchange, depends only on the geometry, the moment
//! field and the interaction parameters, and is rebuilt whenever one of them
//! changes.

pub mod dense;
pub mod dipolar;
pub mod exchange;
pub mod sparse;

use std::fmt;

use tracing::debug;

use crate::config::KernelReduction;
use crate::error::{SimError, SimResult};
use crate::geometry::Geometry;
use crate::params::CellField;
use crate::parallel::map_cells;

pub use dense::DenseKernel;
pub use dipolar::{nearest_neighbour_coupling, Dipolar};
pub use exchange::exchange_kernel;
pub use sparse::SparseKernel;

use dipolar::PairCoupling;

/// Query interface shared by the dense and the reduced kernels.
pub trait CouplingKernel: Send + Sync + fmt::Debug {
    fn n_cells(&self) -> usize;

    /// `J(i, j)`; zero on the diagonal and for dropped pairs.
    fn coupling(&self, i: usize, j: usize) -> f64;

    /// Visit every non-zero `(j, J(i, j))` of row `i` in increasing `j`.
    fn for_each_coupling(&self, i: usize, f: &mut dyn FnMut(usize, f64));

    /// `Σ_j J(i, j)·s_j`.
    fn field(&self, i: usize, spins: &[i8]) -> f64 {
        let mut h = 0.0;
        self.for_each_coupling(i, &mut |j, c| h += c * spins[j] as f64);
        h
    }

    /// Stored non-zero entries, counting `(i, j)` and `(j, i)` separately.
    fn nonzero_count(&self) -> usize;

    fn max_abs(&self) -> f64;
}

/// Running maximum of `|c|` that keeps a NaN once it has seen one.
#[inline]
fn abs_max(m: f64, c: f64) -> f64 {
    if c.is_nan() || c.abs() > m {
        c.abs()
    } else {
        m
    }
}

/// Build the kernel selected by `reduction`. `exchange` couplings are added
/// on top of the reduced dipolar ones and are never dropped.
///
/// Fails with [`SimError::NumericInstability`] when a coupling is not finite
/// (e.g. moments so large that the product overflows).
#[cfg_attr(feature = "profile", inline(never))]
pub fn build_kernel(
    geometry: &Geometry,
    moment: &CellField,
    reduction: KernelReduction,
    dipolar: Dipolar,
    exchange: Option<&SparseKernel>,
    sequential: bool,
) -> SimResult<Box<dyn CouplingKernel>> {
    let n = geometry.n_cells();
    if moment.len() != n {
        return Err(SimError::Configuration(format!(
            "moment field has {} values, geometry has {n} cells",
            moment.len()
        )));
    }
    let pairs = PairCoupling::new(geometry, moment, dipolar);

    let with_exchange = |i: usize, row: &mut Vec<(u32, f64)>| {
        if let Some(ex) = exchange {
            ex.for_each_coupling(i, &mut |j, c| row.push((j as u32, c)));
        }
    };

    let kernel: Box<dyn CouplingKernel> = match reduction {
        KernelReduction::Full => Box::new(DenseKernel::build(&pairs, exchange, n, sequential)),
        KernelReduction::Truncated { radius } => {
            let rows = truncated_rows(geometry, &pairs, radius, sequential);
            let rows = rows
                .into_iter()
                .enumerate()
                .map(|(i, mut row)| {
                    with_exchange(i, &mut row);
                    row
                })
                .collect();
            Box::new(SparseKernel::from_rows(rows))
        }
        KernelReduction::Threshold { min_magnitude } => {
            let rows = map_cells(n, sequential, |i| {
                let mut row: Vec<(u32, f64)> = (0..n)
                    .filter(|&j| j != i)
                    .map(|j| (j as u32, pairs.full(i, j)))
                    .filter(|(_, c)| c.abs() >= min_magnitude)
                    .collect();
                with_exchange(i, &mut row);
                row
            });
            Box::new(SparseKernel::from_rows(rows))
        }
    };

    if !kernel.max_abs().is_finite() {
        return Err(SimError::NumericInstability(
            "coupling kernel overflowed".to_string(),
        ));
    }
    debug!(
        n_cells = n,
        ?reduction,
        nonzero = kernel.nonzero_count(),
        max_abs = kernel.max_abs(),
        "built coupling kernel"
    );
    Ok(kernel)
}

/// Rows of the pairs within a square window of grid offsets.
///
/// Under periodic boundaries only the minimum image is kept, so the window
/// reaches at most half the grid. On an even extent the cell exactly half the
/// grid away has two equidistant images; the pair is counted once, with the
/// mean coupling of those images.
fn truncated_rows(
    geometry: &Geometry,
    pairs: &PairCoupling<'_>,
    radius: usize,
    sequential: bool,
) -> Vec<Vec<(u32, f64)>> {
    let periodic = geometry.periodic;
    let reach = |n: usize| {
        if periodic {
            radius.min(n / 2) as i64
        } else {
            radius.min(n - 1) as i64
        }
    };
    let half = |n: usize| (periodic && n % 2 == 0).then_some((n / 2) as i64);
    let (rx, ry) = (reach(geometry.nx), reach(geometry.ny));
    let (hx, hy) = (half(geometry.nx), half(geometry.ny));

    map_cells(geometry.n_cells(), sequential, |i| {
        let mut row = Vec::new();
        let mut images = Vec::with_capacity(4);
        for oy in -ry..=ry {
            for ox in -rx..=rx {
                // the half-grid image is visited from the positive side
                if (ox == 0 && oy == 0) || hx == Some(-ox) || hy == Some(-oy) {
                    continue;
                }
                let Some(j) = geometry.neighbour_at(i, ox, oy) else {
                    continue;
                };
                if j == i {
                    continue;
                }
                let xs: &[i64] = if hx == Some(ox) { &[ox, -ox] } else { &[ox] };
                let ys: &[i64] = if hy == Some(oy) { &[oy, -oy] } else { &[oy] };
                images.clear();
                for &y in ys {
                    for &x in xs {
                        images.push(pairs.at_offset(
                            i,
                            j,
                            x as f64 * geometry.dx,
                            y as f64 * geometry.dy,
                        ));
                    }
                }
                // both rows of the pair see the same values; sum them in one order
                images.sort_unstable_by(f64::total_cmp);
                let c = images.iter().sum::<f64>() / images.len() as f64;
                row.push((j as u32, c));
            }
        }
        row
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeometryKind;
    use approx::assert_relative_eq;

    fn kernel_for(
        kind: GeometryKind,
        n: usize,
        periodic: bool,
        reduction: KernelReduction,
    ) -> (Geometry, Box<dyn CouplingKernel>) {
        let geom = kind.build(1e-6, n, 0.0, periodic).unwrap();
        let moment = CellField::uniform("moment", geom.n_cells(), 1.6e-16).unwrap();
        let k = build_kernel(&geom, &moment, reduction, Dipolar::default(), None, false).unwrap();
        (geom, k)
    }

    fn assert_symmetric(k: &dyn CouplingKernel) {
        for i in 0..k.n_cells() {
            assert_eq!(k.coupling(i, i), 0.0);
            for j in 0..k.n_cells() {
                assert_eq!(k.coupling(i, j).to_bits(), k.coupling(j, i).to_bits());
            }
        }
    }

    #[test]
    fn test_all_reductions_symmetric() {
        for periodic in [false, true] {
            for reduction in [
                KernelReduction::Full,
                KernelReduction::Truncated { radius: 2 },
                // reaches half the 12x4 periodic grid on both axes
                KernelReduction::Truncated { radius: 6 },
                KernelReduction::Threshold {
                    min_magnitude: 1e-26,
                },
            ] {
                let (_, k) = kernel_for(GeometryKind::IpKagome, 12, periodic, reduction);
                assert_symmetric(k.as_ref());
            }
        }
    }

    #[test]
    fn test_rebuild_is_identical() {
        let geom = GeometryKind::IpPinwheel.build(1e-6, 8, 0.0, true).unwrap();
        let moment = CellField::uniform("moment", geom.n_cells(), 1.6e-16).unwrap();
        let a = build_kernel(&geom, &moment, KernelReduction::Full, Dipolar::default(), None, false)
            .unwrap();
        let b = build_kernel(&geom, &moment, KernelReduction::Full, Dipolar::default(), None, true)
            .unwrap();
        for i in 0..geom.n_cells() {
            for j in 0..geom.n_cells() {
                assert_eq!(a.coupling(i, j).to_bits(), b.coupling(i, j).to_bits());
            }
        }
    }

    #[test]
    fn test_truncated_matches_dense_inside_window() {
        let (geom, dense) = kernel_for(GeometryKind::IpSquare, 10, false, KernelReduction::Full);
        let (_, sparse) = kernel_for(
            GeometryKind::IpSquare,
            10,
            false,
            KernelReduction::Truncated { radius: 3 },
        );
        for i in 0..geom.n_cells() {
            for j in 0..geom.n_cells() {
                let (a, b) = (geom.cell(i), geom.cell(j));
                let inside = a.ix.abs_diff(b.ix) <= 3 && a.iy.abs_diff(b.iy) <= 3;
                if inside {
                    assert_relative_eq!(
                        sparse.coupling(i, j),
                        dense.coupling(i, j),
                        max_relative = 1e-12
                    );
                } else {
                    assert_eq!(sparse.coupling(i, j), 0.0);
                }
            }
        }
        assert!(sparse.nonzero_count() < dense.nonzero_count());
    }

    #[test]
    fn test_threshold_drops_weak_pairs() {
        let (_, dense) = kernel_for(GeometryKind::OopSquare, 6, false, KernelReduction::Full);
        // keeps nearest neighbours, drops diagonals at 1/2^1.5
        let cutoff = dense.max_abs() / 2.0;
        let (_, thresh) = kernel_for(
            GeometryKind::OopSquare,
            6,
            false,
            KernelReduction::Threshold {
                min_magnitude: cutoff,
            },
        );
        // nearest neighbours only: 2 * (5 * 6) horizontal+vertical bonds, both directions
        assert_eq!(thresh.nonzero_count(), 2 * 2 * 30);
        assert_eq!(thresh.coupling(0, 1), dense.coupling(0, 1));
        assert_eq!(thresh.coupling(0, 7), 0.0);
    }

    #[test]
    fn test_field_matches_coupling_sum() {
        let (geom, k) = kernel_for(GeometryKind::IpSquare, 6, true, KernelReduction::Full);
        let spins: Vec<i8> = (0..geom.n_cells())
            .map(|i| if i % 3 == 0 { -1 } else { 1 })
            .collect();
        for i in 0..geom.n_cells() {
            let direct: f64 = (0..geom.n_cells())
                .map(|j| k.coupling(i, j) * spins[j] as f64)
                .sum();
            assert_relative_eq!(k.field(i, &spins), direct, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_periodic_window_counts_half_grid_once() {
        // extent 2: the only neighbour along each axis is half the grid away
        let (geom, k) = kernel_for(
            GeometryKind::OopSquare,
            2,
            true,
            KernelReduction::Truncated { radius: 1 },
        );
        assert_eq!(geom.n_cells(), 4);
        assert_eq!(k.nonzero_count(), 4 * 3);
        assert_symmetric(k.as_ref());

        // 4x4 with the window at half the grid: every other cell exactly once
        let (geom, k) = kernel_for(
            GeometryKind::OopSquare,
            4,
            true,
            KernelReduction::Truncated { radius: 2 },
        );
        assert_eq!(k.nonzero_count(), 16 * 15);
        let far = geom.cell_at(2, 0).unwrap();
        let near = geom.cell_at(1, 0).unwrap();
        // an out-of-plane pair two cells away couples at 1/8 of a neighbour
        assert_relative_eq!(k.coupling(0, far), k.coupling(0, near) / 8.0, max_relative = 1e-12);
    }

    #[test]
    fn test_exchange_added_to_every_reduction() {
        let geom = GeometryKind::IpKagome.build(1e-6, 12, 0.0, false).unwrap();
        let moment = CellField::uniform("moment", geom.n_cells(), 1.6e-16).unwrap();
        let ex = exchange_kernel(&geom, 5e-21).unwrap().unwrap();
        for reduction in [
            KernelReduction::Full,
            // narrower than the (±2, 0) kagome neighbours
            KernelReduction::Truncated { radius: 1 },
            KernelReduction::Threshold { min_magnitude: 1.0 },
        ] {
            let plain =
                build_kernel(&geom, &moment, reduction, Dipolar::default(), None, true).unwrap();
            let both =
                build_kernel(&geom, &moment, reduction, Dipolar::default(), Some(&ex), true)
                    .unwrap();
            assert_symmetric(both.as_ref());
            for i in 0..geom.n_cells() {
                for j in 0..geom.n_cells() {
                    assert_relative_eq!(
                        both.coupling(i, j),
                        plain.coupling(i, j) + ex.coupling(i, j),
                        max_relative = 1e-12,
                        epsilon = 1e-36
                    );
                }
            }
        }
    }

    #[test]
    fn test_overflow_detected() {
        let geom = GeometryKind::OopSquare.build(1e-9, 2, 0.0, false).unwrap();
        let moment = CellField::uniform("moment", 4, 1e200).unwrap();
        assert!(matches!(
            build_kernel(&geom, &moment, KernelReduction::Full, Dipolar::default(), None, true),
            Err(SimError::NumericInstability(_))
        ));
    }
}
