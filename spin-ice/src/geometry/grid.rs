use serde::Serialize;

use super::kinds::GeometryKind;
use crate::error::{SimError, SimResult};

const EMPTY: u32 = u32::MAX;

/// One occupied grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Cell {
    pub ix: usize,
    pub iy: usize,
    /// Position [m].
    pub x: f64,
    pub y: f64,
    /// In-plane orientation of the magnet's easy axis [rad]. Unused for
    /// out-of-plane lattices.
    pub angle: f64,
}

/// Occupied cells of an `nx × ny` grid with their positions and orientations.
///
/// Cells are indexed in row-major order (`iy` outer, `ix` inner) over the
/// occupied cells only; every per-cell array in the crate uses this index.
/// Immutable after construction.
#[derive(Debug, Clone)]
pub struct Geometry {
    /// Grid extent along x.
    pub nx: usize,
    /// Grid extent along y.
    pub ny: usize,
    /// Grid spacing along x [m].
    pub dx: f64,
    /// Grid spacing along y [m].
    pub dy: f64,
    /// In-plane magnets carry an orientation; out-of-plane ones point along z.
    pub in_plane: bool,
    /// Periodic boundaries along both axes.
    pub periodic: bool,
    kind: Option<GeometryKind>,
    cells: Vec<Cell>,
    /// Grid → cell index, `EMPTY` where unoccupied. Length `nx * ny`.
    cell_index: Vec<u32>,
}

impl Geometry {
    /// Build a geometry from explicit `(ix, iy, angle)` cells.
    pub fn from_cells(
        nx: usize,
        ny: usize,
        dx: f64,
        dy: f64,
        in_plane: bool,
        periodic: bool,
        cells: impl IntoIterator<Item = (usize, usize, f64)>,
    ) -> SimResult<Self> {
        Self::assemble(nx, ny, dx, dy, in_plane, periodic, None, cells)
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn assemble(
        nx: usize,
        ny: usize,
        dx: f64,
        dy: f64,
        in_plane: bool,
        periodic: bool,
        kind: Option<GeometryKind>,
        cells: impl IntoIterator<Item = (usize, usize, f64)>,
    ) -> SimResult<Self> {
        if nx == 0 || ny == 0 {
            return Err(SimError::Configuration(format!(
                "grid extent must be positive, got {nx}x{ny}"
            )));
        }
        let n_grid = nx
            .checked_mul(ny)
            .filter(|&n| n < EMPTY as usize)
            .ok_or_else(|| {
                SimError::Configuration(format!("grid {nx}x{ny} is too large to index"))
            })?;
        for (name, d) in [("dx", dx), ("dy", dy)] {
            if !(d.is_finite() && d > 0.0) {
                return Err(SimError::Configuration(format!(
                    "grid spacing {name} must be finite and > 0, got {d}"
                )));
            }
        }

        let mut angles = vec![None; n_grid];
        for (ix, iy, angle) in cells {
            if ix >= nx || iy >= ny {
                return Err(SimError::Configuration(format!(
                    "cell ({ix}, {iy}) lies outside the {nx}x{ny} grid"
                )));
            }
            if in_plane && !angle.is_finite() {
                return Err(SimError::Configuration(format!(
                    "cell ({ix}, {iy}) has non-finite angle {angle}"
                )));
            }
            let slot = &mut angles[iy * nx + ix];
            if slot.is_some() {
                return Err(SimError::Configuration(format!(
                    "cell ({ix}, {iy}) occupied twice"
                )));
            }
            *slot = Some(angle);
        }

        let mut cell_index = vec![EMPTY; n_grid];
        let mut out = Vec::new();
        for iy in 0..ny {
            for ix in 0..nx {
                if let Some(angle) = angles[iy * nx + ix] {
                    cell_index[iy * nx + ix] = out.len() as u32;
                    out.push(Cell {
                        ix,
                        iy,
                        x: ix as f64 * dx,
                        y: iy as f64 * dy,
                        angle: if in_plane { angle } else { 0.0 },
                    });
                }
            }
        }
        if out.is_empty() {
            return Err(SimError::Configuration(format!(
                "geometry on a {nx}x{ny} grid has no occupied cells"
            )));
        }

        Ok(Self {
            nx,
            ny,
            dx,
            dy,
            in_plane,
            periodic,
            kind,
            cells: out,
            cell_index,
        })
    }

    /// Number of occupied cells.
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn cell(&self, i: usize) -> &Cell {
        &self.cells[i]
    }

    /// `(ix, iy)` of cell `i`.
    #[inline]
    pub fn grid_index(&self, i: usize) -> (usize, usize) {
        let c = &self.cells[i];
        (c.ix, c.iy)
    }

    /// Cell at grid offset `(ox, oy)` from cell `i`, wrapping under periodic
    /// boundaries. `None` off the grid or on an empty grid cell.
    pub fn neighbour_at(&self, i: usize, ox: i64, oy: i64) -> Option<usize> {
        let c = &self.cells[i];
        let (tx, ty) = (c.ix as i64 + ox, c.iy as i64 + oy);
        let (nx, ny) = (self.nx as i64, self.ny as i64);
        let (tx, ty) = if self.periodic {
            (tx.rem_euclid(nx), ty.rem_euclid(ny))
        } else if (0..nx).contains(&tx) && (0..ny).contains(&ty) {
            (tx, ty)
        } else {
            return None;
        };
        self.cell_at(tx as usize, ty as usize)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// The catalog kind this geometry was built from, if any.
    pub fn kind(&self) -> Option<GeometryKind> {
        self.kind
    }

    #[inline]
    pub fn position(&self, i: usize) -> (f64, f64) {
        let c = &self.cells[i];
        (c.x, c.y)
    }

    /// Unit vector along the easy axis, `None` for out-of-plane magnets.
    #[inline]
    pub fn orientation(&self, i: usize) -> Option<(f64, f64)> {
        if self.in_plane {
            let (s, c) = self.cells[i].angle.sin_cos();
            Some((c, s))
        } else {
            None
        }
    }

    /// Index of the cell at grid position `(ix, iy)`, if occupied.
    #[inline]
    pub fn cell_at(&self, ix: usize, iy: usize) -> Option<usize> {
        if ix >= self.nx || iy >= self.ny {
            return None;
        }
        match self.cell_index[iy * self.nx + ix] {
            EMPTY => None,
            idx => Some(idx as usize),
        }
    }

    /// Size of the periodic domain [m].
    #[inline]
    pub fn period(&self) -> (f64, f64) {
        (self.nx as f64 * self.dx, self.ny as f64 * self.dy)
    }

    /// Row-major occupation mask over the full grid.
    pub fn occupation_mask(&self) -> Vec<bool> {
        self.cell_index.iter().map(|&c| c != EMPTY).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_cells_indexed_row_major() {
        // 3x2 grid, cells inserted out of order
        let geom = Geometry::from_cells(
            3,
            2,
            1e-6,
            2e-6,
            true,
            false,
            vec![(2, 1, 0.5), (0, 0, 0.0), (1, 1, 1.0)],
        )
        .unwrap();
        assert_eq!(geom.n_cells(), 3);
        assert_eq!(geom.cell_at(0, 0), Some(0));
        assert_eq!(geom.cell_at(1, 1), Some(1));
        assert_eq!(geom.cell_at(2, 1), Some(2));
        assert_eq!(geom.cell_at(1, 0), None);
        assert_eq!(geom.cell_at(7, 0), None);
        assert_eq!(geom.position(2), (2e-6, 2e-6));
        assert_eq!(geom.grid_index(1), (1, 1));
        assert_eq!(geom.neighbour_at(1, 1, 0), Some(2));
        assert_eq!(geom.neighbour_at(1, 0, -1), None);
        assert_eq!(geom.neighbour_at(2, 1, 0), None);
        assert_eq!(
            geom.occupation_mask(),
            vec![true, false, false, false, true, true]
        );
        let (ox, oy) = geom.orientation(1).unwrap();
        assert!((ox - 1f64.cos()).abs() < 1e-15 && (oy - 1f64.sin()).abs() < 1e-15);
    }

    #[test]
    fn test_out_of_plane_has_no_orientation() {
        let geom =
            Geometry::from_cells(2, 1, 1e-6, 1e-6, false, false, vec![(0, 0, 0.0), (1, 0, 0.0)])
                .unwrap();
        assert_eq!(geom.orientation(0), None);
    }

    #[test]
    fn test_rejects_bad_input() {
        let cells = || vec![(0usize, 0usize, 0.0f64)];
        assert!(Geometry::from_cells(0, 3, 1.0, 1.0, true, false, cells()).is_err());
        assert!(Geometry::from_cells(2, 2, -1.0, 1.0, true, false, cells()).is_err());
        assert!(Geometry::from_cells(2, 2, 1.0, 1.0, true, false, vec![(2, 0, 0.0)]).is_err());
        assert!(Geometry::from_cells(2, 2, 1.0, 1.0, true, false, vec![]).is_err());
        assert!(Geometry::from_cells(
            2,
            2,
            1.0,
            1.0,
            true,
            false,
            vec![(1, 1, 0.0), (1, 1, 0.3)]
        )
        .is_err());
    }
}
