pub mod grid;
pub mod kinds;

pub use grid::{Cell, Geometry};
pub use kinds::{Extent, GeometryKind};
