//! Cell area weights for area-weighted spatial reductions.

use ndarray::Array2;

use crate::dataset::Coords;
use crate::error::GridError;

/// Per-cell area weights aligned to a dataset's (y, x) grid.
///
/// Weights are relative: only ratios matter, so the constructor does not
/// normalize. Invariants: every weight finite and non-negative, and the sum
/// strictly positive.
#[derive(Debug, Clone)]
pub struct CellAreaWeights {
    areas: Array2<f64>,
}

impl CellAreaWeights {
    /// Wrap a weight array after validating the invariants.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidWeights`] when any weight is negative or
    /// non-finite, or when the total is zero.
    pub fn new(areas: Array2<f64>) -> Result<Self, GridError> {
        for &w in areas.iter() {
            if !w.is_finite() {
                return Err(GridError::InvalidWeights {
                    reason: "non-finite weight".into(),
                });
            }
            if w < 0.0 {
                return Err(GridError::InvalidWeights {
                    reason: format!("negative weight {w}"),
                });
            }
        }
        if areas.sum() <= 0.0 {
            return Err(GridError::InvalidWeights {
                reason: "sum is zero".into(),
            });
        }
        Ok(Self { areas })
    }

    /// Cosine-latitude proxy weights for a grid without a cell area file.
    ///
    /// A reasonable stand-in on regular grids: cell area scales with
    /// cos(latitude) when longitude spacing is uniform.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidWeights`] if every latitude lies on a pole
    /// (the proxy degenerates to zero everywhere).
    pub fn cosine_lat(coords: &Coords) -> Result<Self, GridError> {
        let (ny, nx) = coords.shape();
        let areas = Array2::from_shape_fn((ny, nx), |(j, i)| {
            coords.cell_lat(j, i).to_radians().cos().max(0.0)
        });
        Self::new(areas)
    }

    /// The raw weight array.
    pub fn areas(&self) -> &Array2<f64> {
        &self.areas
    }

    /// Grid shape as (rows, columns).
    pub fn shape(&self) -> (usize, usize) {
        self.areas.dim()
    }

    /// Zero out every cell whose latitude falls outside `[lat_min, lat_max]`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::DimensionMismatch`] when the coordinate shape
    /// differs from the weight shape, and [`GridError::InvalidWeights`] when
    /// the band excludes every cell.
    pub fn masked_to_band(
        &self,
        coords: &Coords,
        lat_min: f64,
        lat_max: f64,
    ) -> Result<CellAreaWeights, GridError> {
        if coords.shape() != self.shape() {
            return Err(GridError::DimensionMismatch {
                name: "cell_area".into(),
                expected: self.shape().0 * self.shape().1,
                got: coords.shape().0 * coords.shape().1,
            });
        }
        let (ny, nx) = self.shape();
        let areas = Array2::from_shape_fn((ny, nx), |(j, i)| {
            let lat = coords.cell_lat(j, i);
            if lat >= lat_min && lat <= lat_max {
                self.areas[(j, i)]
            } else {
                0.0
            }
        });
        Self::new(areas).map_err(|_| GridError::InvalidWeights {
            reason: format!("latitude band [{lat_min}, {lat_max}] excludes every cell"),
        })
    }
}
