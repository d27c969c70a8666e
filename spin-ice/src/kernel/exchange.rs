//! Nearest-neighbour exchange on catalog lattices.
//!
//! Pair energy `−J_ex·(o_i·o_j)·s_i·s_j` for in-plane magnets (XY form on a
//! pinned axis) and `−J_ex·s_i·s_j` out of plane, over the lattice's
//! nearest-neighbour table.

use super::SparseKernel;
use crate::error::{SimError, SimResult};
use crate::geometry::Geometry;

/// `o_i·o_j`, or 1 for out-of-plane magnets.
#[inline]
fn alignment(geometry: &Geometry, i: usize, j: usize) -> f64 {
    match (geometry.orientation(i), geometry.orientation(j)) {
        (Some((ax, ay)), Some((bx, by))) => ax * bx + ay * by,
        _ => 1.0,
    }
}

/// Exchange couplings of strength `strength` [J], `None` when it is zero.
///
/// Custom geometries have no neighbour table, so a non-zero strength on one
/// is a configuration error.
pub fn exchange_kernel(geometry: &Geometry, strength: f64) -> SimResult<Option<SparseKernel>> {
    if strength == 0.0 {
        return Ok(None);
    }
    if !strength.is_finite() {
        return Err(SimError::Configuration(format!(
            "exchange strength must be finite, got {strength}"
        )));
    }
    let Some(kind) = geometry.kind() else {
        return Err(SimError::Configuration(
            "exchange needs a catalog lattice; custom geometries have no neighbour table"
                .to_string(),
        ));
    };
    let offsets = kind.nearest_neighbours();
    let rows = (0..geometry.n_cells())
        .map(|i| {
            offsets
                .iter()
                .filter_map(|&(ox, oy)| geometry.neighbour_at(i, ox, oy))
                .filter(|&j| j != i)
                .map(|j| (j as u32, strength * alignment(geometry, i, j)))
                .collect()
        })
        .collect();
    Ok(Some(SparseKernel::from_rows(rows)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeometryKind;
    use crate::kernel::CouplingKernel;
    use approx::assert_relative_eq;

    #[test]
    fn test_square_grid_neighbours() {
        let geom = GeometryKind::OopSquare.build(1e-6, 4, 0.0, false).unwrap();
        let ex = exchange_kernel(&geom, 2e-21).unwrap().unwrap();
        // 2 * 4 * 3 bonds, stored in both directions
        assert_eq!(ex.nonzero_count(), 2 * 24);
        assert_eq!(ex.coupling(0, 1), 2e-21);
        assert_eq!(ex.coupling(0, 5), 0.0);
    }

    #[test]
    fn test_in_plane_uses_axis_alignment() {
        // square ice neighbours are perpendicular
        let geom = GeometryKind::IpSquare.build(1e-6, 6, 0.0, false).unwrap();
        let ex = exchange_kernel(&geom, 1e-21).unwrap().unwrap();
        let i = geom.cell_at(1, 2).unwrap();
        let j = geom.cell_at(2, 3).unwrap();
        assert_relative_eq!(ex.coupling(i, j), 0.0, epsilon = 1e-36);

        let geom = GeometryKind::IpIsing.build(1e-6, 4, 0.0, false).unwrap();
        let ex = exchange_kernel(&geom, 1e-21).unwrap().unwrap();
        assert_relative_eq!(ex.coupling(0, 1), 1e-21, max_relative = 1e-12);
    }

    #[test]
    fn test_periodic_wraps_and_stays_symmetric() {
        let geom = GeometryKind::IpKagome.build(1e-6, 12, 0.0, true).unwrap();
        let ex = exchange_kernel(&geom, 1e-21).unwrap().unwrap();
        for i in 0..geom.n_cells() {
            for j in 0..geom.n_cells() {
                assert_eq!(ex.coupling(i, j).to_bits(), ex.coupling(j, i).to_bits());
            }
        }
        let edge = geom.cell_at(0, 1).unwrap();
        let mut neighbours = 0;
        ex.for_each_coupling(edge, &mut |_, _| neighbours += 1);
        assert_eq!(neighbours, 4);
    }

    #[test]
    fn test_zero_and_custom_geometry() {
        let geom = GeometryKind::OopSquare.build(1e-6, 3, 0.0, false).unwrap();
        assert!(exchange_kernel(&geom, 0.0).unwrap().is_none());
        assert!(exchange_kernel(&geom, f64::NAN).is_err());
        let custom =
            Geometry::from_cells(2, 1, 1e-6, 1e-6, false, false, vec![(0, 0, 0.0), (1, 0, 0.0)])
                .unwrap();
        assert!(exchange_kernel(&custom, 1e-21).is_err());
        assert!(exchange_kernel(&custom, 0.0).unwrap().is_none());
    }
}
