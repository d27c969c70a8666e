use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, FRAC_PI_6};

use serde::{Deserialize, Serialize};

use super::grid::Geometry;
use crate::error::{SimError, SimResult};

/// Grid extent: a single `n` or explicit `(nx, ny)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extent {
    Square(usize),
    Rect { nx: usize, ny: usize },
}

impl From<usize> for Extent {
    fn from(n: usize) -> Self {
        Self::Square(n)
    }
}

impl From<(usize, usize)> for Extent {
    fn from((nx, ny): (usize, usize)) -> Self {
        Self::Rect { nx, ny }
    }
}

/// Built-in artificial spin-ice lattices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    /// Out-of-plane magnets on every site of a square grid; `a` = nearest-neighbor distance.
    OopSquare,
    /// In-plane magnets on every site, all along x; `a` = nearest-neighbor distance.
    IpIsing,
    /// In-plane magnets on the edges of squares; `a` = square side.
    IpSquare,
    /// `IpSquare` with every magnet rotated by −45°.
    IpPinwheel,
    /// In-plane magnets on the edges of hexagons; `a` = distance between opposite hexagon sides.
    IpKagome,
    /// `IpKagome` with every magnet rotated by −90°, i.e. on the edges of triangles.
    IpTriangle,
}

impl TryFrom<&str> for GeometryKind {
    type Error = String;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "oop_square" => Ok(Self::OopSquare),
            "ip_ising" => Ok(Self::IpIsing),
            "ip_square" => Ok(Self::IpSquare),
            "ip_pinwheel" => Ok(Self::IpPinwheel),
            "ip_kagome" => Ok(Self::IpKagome),
            "ip_triangle" => Ok(Self::IpTriangle),
            _ => Err(format!(
                "unknown geometry '{s}', expected one of 'oop_square', 'ip_ising', \
                 'ip_square', 'ip_pinwheel', 'ip_kagome', 'ip_triangle'"
            )),
        }
    }
}

impl GeometryKind {
    pub fn in_plane(self) -> bool {
        !matches!(self, Self::OopSquare)
    }

    /// Grid spacing `(dx, dy)` for characteristic length `a`.
    pub fn spacing(self, a: f64) -> (f64, f64) {
        match self {
            Self::OopSquare | Self::IpIsing => (a, a),
            Self::IpSquare | Self::IpPinwheel => (a / 2.0, a / 2.0),
            Self::IpKagome | Self::IpTriangle => {
                let dx = a / 4.0;
                (dx, 3f64.sqrt() * dx)
            }
        }
    }

    /// Expected share of occupied grid cells on a large grid.
    pub fn nominal_fraction(self) -> f64 {
        match self {
            Self::OopSquare | Self::IpIsing => 1.0,
            Self::IpSquare | Self::IpPinwheel => 0.5,
            Self::IpKagome | Self::IpTriangle => 0.375,
        }
    }

    /// Grid offsets `(dx, dy)` of a magnet's nearest neighbours, used by the
    /// exchange term and [`Simulation::nn_interaction`](crate::Simulation::nn_interaction).
    pub fn nearest_neighbours(self) -> &'static [(i64, i64)] {
        match self {
            Self::OopSquare | Self::IpIsing => &[(0, -1), (-1, 0), (1, 0), (0, 1)],
            Self::IpSquare | Self::IpPinwheel => &[(-1, -1), (1, -1), (-1, 1), (1, 1)],
            Self::IpKagome | Self::IpTriangle => {
                &[(-1, -1), (1, -1), (-2, 0), (2, 0), (-1, 1), (1, 1)]
            }
        }
    }

    pub fn occupied(self, ix: usize, iy: usize) -> bool {
        let (x, y) = (ix as i64, iy as i64);
        match self {
            Self::OopSquare | Self::IpIsing => true,
            Self::IpSquare | Self::IpPinwheel => (x + y).rem_euclid(2) == 1,
            Self::IpKagome | Self::IpTriangle => {
                (x + y).rem_euclid(4) == 1 || (x - y).rem_euclid(4) == 3
            }
        }
    }

    /// Easy-axis angle of the magnet at `(ix, iy)` before the global offset.
    pub fn angle(self, ix: usize, iy: usize) -> f64 {
        let (x, y) = (ix as i64, iy as i64);
        match self {
            Self::OopSquare | Self::IpIsing => 0.0,
            Self::IpSquare => {
                if y.rem_euclid(2) == 1 {
                    FRAC_PI_2
                } else {
                    0.0
                }
            }
            Self::IpPinwheel => Self::IpSquare.angle(ix, iy) - FRAC_PI_4,
            Self::IpKagome => {
                let odd_column = x.rem_euclid(2) == 1;
                if odd_column && (x - y).rem_euclid(4) == 1 {
                    -FRAC_PI_6
                } else if odd_column && (x + y).rem_euclid(4) == 3 {
                    FRAC_PI_6
                } else {
                    FRAC_PI_2
                }
            }
            Self::IpTriangle => Self::IpKagome.angle(ix, iy) - FRAC_PI_2,
        }
    }

    /// State of `(ix, iy)` in the antiferromagnetic pattern.
    pub fn afm_state(self, ix: usize, iy: usize) -> i8 {
        let (x, y) = (ix as i64, iy as i64);
        let up = match self {
            Self::OopSquare => (x - y).rem_euclid(2) == 1,
            Self::IpIsing => y.rem_euclid(2) == 1,
            Self::IpSquare | Self::IpPinwheel => (x - y).div_euclid(2).rem_euclid(2) == 1,
            Self::IpKagome | Self::IpTriangle => (x + y).rem_euclid(4) != 3,
        };
        if up {
            1
        } else {
            -1
        }
    }

    /// Resolve the grid extent. Kagome-type lattices given a single `n` pick
    /// `ny` so the domain is roughly square.
    pub fn grid_extent(self, extent: Extent, periodic: bool) -> (usize, usize) {
        match (self, extent) {
            (_, Extent::Rect { nx, ny }) => (nx, ny),
            (Self::IpKagome | Self::IpTriangle, Extent::Square(n)) => {
                let mut ny = ((n as f64 / 3f64.sqrt()) as usize) / 4 * 4;
                if !periodic {
                    // drop the row of dangling magnets
                    ny = ny.saturating_sub(1);
                }
                (n, ny)
            }
            (_, Extent::Square(n)) => (n, n),
        }
    }

    /// Build the geometry of this kind.
    ///
    /// Fails when the extent is empty, `a` is not a positive length, or the
    /// grid is too small to host the kind's unit cell (occupied count more
    /// than `nx + ny` away from the nominal fraction).
    pub fn build(
        self,
        a: f64,
        extent: impl Into<Extent>,
        angle_offset: f64,
        periodic: bool,
    ) -> SimResult<Geometry> {
        if !(a.is_finite() && a > 0.0) {
            return Err(SimError::Configuration(format!(
                "characteristic length a must be finite and > 0, got {a}"
            )));
        }
        let (nx, ny) = self.grid_extent(extent.into(), periodic);
        let (dx, dy) = self.spacing(a);
        let cells = (0..ny).flat_map(move |iy| {
            (0..nx)
                .filter(move |&ix| self.occupied(ix, iy))
                .map(move |ix| (ix, iy, self.angle(ix, iy) + angle_offset))
        });
        let geom =
            Geometry::assemble(nx, ny, dx, dy, self.in_plane(), periodic, Some(self), cells)?;

        let expected = self.nominal_fraction() * (nx * ny) as f64;
        let deviation = (geom.n_cells() as f64 - expected).abs();
        if deviation > (nx + ny) as f64 {
            return Err(SimError::Configuration(format!(
                "{self:?} on a {nx}x{ny} grid occupies {} cells, expected about {expected:.0}",
                geom.n_cells()
            )));
        }
        Ok(geom)
    }
}
