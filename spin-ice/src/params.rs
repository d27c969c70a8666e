use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::geometry::Geometry;

/// Boltzmann constant [J/K].
pub const K_B: f64 = 1.380649e-23;

/// Non-negative, finite per-cell values indexed like the geometry's cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CellField {
    values: Vec<f64>,
}

impl CellField {
    pub fn uniform(name: &str, n_cells: usize, value: f64) -> SimResult<Self> {
        Self::from_values(name, n_cells, vec![value; n_cells])
    }

    pub fn from_values(name: &str, n_cells: usize, values: Vec<f64>) -> SimResult<Self> {
        if values.len() != n_cells {
            return Err(SimError::Configuration(format!(
                "{name} field has {} values, geometry has {n_cells} cells",
                values.len()
            )));
        }
        if let Some((i, v)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !(v.is_finite() && **v >= 0.0))
        {
            return Err(SimError::Configuration(format!(
                "{name} of cell {i} must be finite and >= 0, got {v}"
            )));
        }
        Ok(Self { values })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }
}

impl Index<usize> for CellField {
    type Output = f64;
    #[inline]
    fn index(&self, i: usize) -> &f64 {
        &self.values[i]
    }
}

/// A uniform value or one value per cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValues {
    Uniform(f64),
    PerCell(Vec<f64>),
}

impl From<f64> for ParamValues {
    fn from(v: f64) -> Self {
        Self::Uniform(v)
    }
}

impl From<Vec<f64>> for ParamValues {
    fn from(v: Vec<f64>) -> Self {
        Self::PerCell(v)
    }
}

impl ParamValues {
    pub fn into_field(self, name: &str, n_cells: usize) -> SimResult<CellField> {
        match self {
            Self::Uniform(v) => CellField::uniform(name, n_cells, v),
            Self::PerCell(v) => CellField::from_values(name, n_cells, v),
        }
    }
}

/// Initial values of the physical parameter fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamsConfig {
    /// Magnetic moment [A·m²].
    pub moment: ParamValues,
    /// Intrinsic switching barrier [J].
    pub e_barrier: ParamValues,
    /// [K]
    pub temperature: ParamValues,
    /// Uniaxial anisotropy energy [J].
    pub anisotropy: ParamValues,
}

impl Default for ParamsConfig {
    fn default() -> Self {
        Self {
            // Msat = 800 kA/m over a 2e-22 m³ island
            moment: ParamValues::Uniform(800e3 * 2e-22),
            e_barrier: ParamValues::Uniform(5e-22),
            temperature: ParamValues::Uniform(300.0),
            anisotropy: ParamValues::Uniform(0.0),
        }
    }
}

/// Spatially varying physical parameters, one value per occupied cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameters {
    pub moment: CellField,
    pub e_barrier: CellField,
    pub temperature: CellField,
    pub anisotropy: CellField,
}

impl Parameters {
    pub fn new(geometry: &Geometry, cfg: ParamsConfig) -> SimResult<Self> {
        let n = geometry.n_cells();
        Ok(Self {
            moment: cfg.moment.into_field("moment", n)?,
            e_barrier: cfg.e_barrier.into_field("e_barrier", n)?,
            temperature: cfg.temperature.into_field("temperature", n)?,
            anisotropy: cfg.anisotropy.into_field("anisotropy", n)?,
        })
    }

    /// Thermal energy k·T of cell `i` [J].
    #[inline]
    pub fn kt(&self, i: usize) -> f64 {
        K_B * self.temperature[i]
    }

    pub fn all_frozen(&self) -> bool {
        self.temperature.as_slice().iter().all(|&t| t == 0.0)
    }
}

/// External magnetic field [T].
///
/// For in-plane lattices `angle` is the field direction in the plane; for
/// out-of-plane lattices `magnitude` is the signed z component and `angle`
/// is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalField {
    Uniform { magnitude: f64, angle: f64 },
    PerCell { magnitude: Vec<f64>, angle: Vec<f64> },
}

impl Default for ExternalField {
    fn default() -> Self {
        Self::Uniform {
            magnitude: 0.0,
            angle: 0.0,
        }
    }
}

impl ExternalField {
    pub fn uniform(magnitude: f64, angle: f64) -> Self {
        Self::Uniform { magnitude, angle }
    }

    pub(crate) fn check_shape(&self, n_cells: usize) -> SimResult<()> {
        if let Self::PerCell { magnitude, angle } = self {
            if magnitude.len() != n_cells || angle.len() != n_cells {
                return Err(SimError::Configuration(format!(
                    "per-cell field has {} magnitudes and {} angles, geometry has {n_cells} cells",
                    magnitude.len(),
                    angle.len()
                )));
            }
        }
        Ok(())
    }

    #[inline]
    fn at(&self, i: usize) -> (f64, f64) {
        match self {
            Self::Uniform { magnitude, angle } => (*magnitude, *angle),
            Self::PerCell { magnitude, angle } => (magnitude[i], angle[i]),
        }
    }

    /// Field component along the easy axis of cell `i` [T].
    #[inline]
    pub fn projection(&self, geometry: &Geometry, i: usize) -> f64 {
        let (magnitude, angle) = self.at(i);
        match geometry.orientation(i) {
            Some((ox, oy)) => {
                let (s, c) = angle.sin_cos();
                magnitude * (c * ox + s * oy)
            }
            None => magnitude,
        }
    }
}
