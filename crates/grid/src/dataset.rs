//! Gridded dataset types.

use ndarray::{Array2, Array3, Array4, Axis};

use crate::error::GridError;
use crate::month::{self, MonthKey};

// ---------------------------------------------------------------------------
// Coords
// ---------------------------------------------------------------------------

/// Spatial coordinates of a gridded dataset.
///
/// Rectilinear grids carry 1-D axis-aligned latitude/longitude vectors.
/// Curvilinear grids (e.g. ocean model native grids) carry 2-D arrays giving
/// each cell's latitude/longitude, indexed by the model's (j, i) grid axes.
#[derive(Debug, Clone, PartialEq)]
pub enum Coords {
    /// 1-D axis-aligned coordinates.
    Rectilinear {
        /// Latitude per row, degrees north.
        lat: Vec<f64>,
        /// Longitude per column, degrees east.
        lon: Vec<f64>,
    },
    /// 2-D per-cell coordinates indexed by (j, i).
    Curvilinear {
        /// Latitude per cell, degrees north.
        lat: Array2<f64>,
        /// Longitude per cell, degrees east.
        lon: Array2<f64>,
    },
}

impl Coords {
    /// Grid shape as (rows, columns).
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Coords::Rectilinear { lat, lon } => (lat.len(), lon.len()),
            Coords::Curvilinear { lat, .. } => (lat.nrows(), lat.ncols()),
        }
    }

    /// True for 1-D axis-aligned grids.
    pub fn is_rectilinear(&self) -> bool {
        matches!(self, Coords::Rectilinear { .. })
    }

    /// Latitude of the cell at (row, column).
    pub fn cell_lat(&self, j: usize, i: usize) -> f64 {
        match self {
            Coords::Rectilinear { lat, .. } => lat[j],
            Coords::Curvilinear { lat, .. } => lat[(j, i)],
        }
    }

    /// Validate a curvilinear coordinate pair, checking the two arrays agree
    /// in shape.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::DimensionMismatch`] when the latitude and
    /// longitude arrays have different shapes.
    pub fn curvilinear(lat: Array2<f64>, lon: Array2<f64>) -> Result<Self, GridError> {
        if lat.dim() != lon.dim() {
            return Err(GridError::DimensionMismatch {
                name: "lon".into(),
                expected: lat.len(),
                got: lon.len(),
            });
        }
        Ok(Coords::Curvilinear { lat, lon })
    }
}

// ---------------------------------------------------------------------------
// GriddedDataset
// ---------------------------------------------------------------------------

/// A labeled field over (time, latitude, longitude).
///
/// The value array is laid out `(time, y, x)` where `(y, x)` matches the
/// coordinate shape. After [`crate::standardize::standardize`] the invariants
/// hold: latitude strictly increasing in [-90, 90], longitude in [0, 360),
/// time strictly increasing at monthly cadence.
#[derive(Debug, Clone)]
pub struct GriddedDataset {
    variable: String,
    units: Option<String>,
    times: Vec<MonthKey>,
    coords: Coords,
    values: Array3<f64>,
}

impl GriddedDataset {
    /// Create a new dataset after validating that the value array shape
    /// matches the time axis and coordinate shape.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::DimensionMismatch`] on any axis length mismatch.
    pub fn new(
        variable: impl Into<String>,
        units: Option<String>,
        times: Vec<MonthKey>,
        coords: Coords,
        values: Array3<f64>,
    ) -> Result<Self, GridError> {
        let (nt, ny, nx) = values.dim();
        if nt != times.len() {
            return Err(GridError::DimensionMismatch {
                name: "time".into(),
                expected: times.len(),
                got: nt,
            });
        }
        let (cy, cx) = coords.shape();
        if ny != cy {
            return Err(GridError::DimensionMismatch {
                name: "lat".into(),
                expected: cy,
                got: ny,
            });
        }
        if nx != cx {
            return Err(GridError::DimensionMismatch {
                name: "lon".into(),
                expected: cx,
                got: nx,
            });
        }
        Ok(Self {
            variable: variable.into(),
            units,
            times,
            coords,
            values,
        })
    }

    /// Variable short name (e.g. "tas").
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Physical units, when known.
    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    /// Monthly time axis.
    pub fn times(&self) -> &[MonthKey] {
        &self.times
    }

    /// Spatial coordinates.
    pub fn coords(&self) -> &Coords {
        &self.coords
    }

    /// The value array, `(time, y, x)`.
    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    /// Number of time steps.
    pub fn n_times(&self) -> usize {
        self.times.len()
    }

    /// True when the time axis is strictly increasing.
    pub fn times_sorted(&self) -> bool {
        month::is_strictly_increasing(&self.times)
    }

    /// Subset to the inclusive month range `[start, end]`.
    ///
    /// Months outside the dataset's coverage are simply absent from the
    /// result; an empty selection yields a dataset with zero time steps.
    pub fn select_period(&self, start: MonthKey, end: MonthKey) -> GriddedDataset {
        let idx: Vec<usize> = self
            .times
            .iter()
            .enumerate()
            .filter(|(_, t)| **t >= start && **t <= end)
            .map(|(i, _)| i)
            .collect();
        let times: Vec<MonthKey> = idx.iter().map(|&i| self.times[i]).collect();
        let values = self.values.select(Axis(0), &idx);
        GriddedDataset {
            variable: self.variable.clone(),
            units: self.units.clone(),
            times,
            coords: self.coords.clone(),
            values,
        }
    }

    /// Concatenate two datasets along time, `self` first.
    ///
    /// The caller is responsible for checking overlap/gap policy between the
    /// two segments; this only validates grid compatibility and the ordering
    /// of the seam.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::DimensionMismatch`] if the grids differ in shape,
    /// or if the second segment does not start after the first ends.
    pub fn concat_time(self, other: GriddedDataset) -> Result<GriddedDataset, GridError> {
        if self.coords.shape() != other.coords.shape() {
            return Err(GridError::DimensionMismatch {
                name: "lat/lon".into(),
                expected: self.coords.shape().0 * self.coords.shape().1,
                got: other.coords.shape().0 * other.coords.shape().1,
            });
        }
        if let (Some(last), Some(first)) = (self.times.last(), other.times.first()) {
            if first <= last {
                return Err(GridError::DimensionMismatch {
                    name: "time".into(),
                    expected: self.times.len() + other.times.len(),
                    got: self.times.len(),
                });
            }
        }
        let mut times = self.times;
        times.extend_from_slice(&other.times);
        let mut values = self.values;
        values
            .append(Axis(0), other.values.view())
            .map_err(|_| GridError::DimensionMismatch {
                name: "time".into(),
                expected: times.len(),
                got: values.dim().0,
            })?;
        Ok(GriddedDataset {
            variable: self.variable,
            units: self.units,
            times,
            coords: self.coords,
            values,
        })
    }

    /// Element-wise mean across several datasets sharing grid and time axis.
    ///
    /// Used to build the ensemble mean from per-member series.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::DimensionMismatch`] when the members disagree in
    /// shape or time axis, or when `members` is empty.
    pub fn mean_of(members: &[GriddedDataset]) -> Result<GriddedDataset, GridError> {
        let first = members.first().ok_or_else(|| GridError::DimensionMismatch {
            name: "ensemble".into(),
            expected: 1,
            got: 0,
        })?;
        for m in &members[1..] {
            if m.values.dim() != first.values.dim() || m.times != first.times {
                return Err(GridError::DimensionMismatch {
                    name: "ensemble".into(),
                    expected: first.n_times(),
                    got: m.n_times(),
                });
            }
        }
        let mut acc = first.values.clone();
        for m in &members[1..] {
            acc += &m.values;
        }
        acc /= members.len() as f64;
        Ok(GriddedDataset {
            variable: first.variable.clone(),
            units: first.units.clone(),
            times: first.times.clone(),
            coords: first.coords.clone(),
            values: acc,
        })
    }

    /// Replace the value array, keeping coordinates and time axis.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::DimensionMismatch`] if the new array's shape
    /// differs from the current one.
    pub fn with_values(mut self, values: Array3<f64>) -> Result<GriddedDataset, GridError> {
        if values.dim() != self.values.dim() {
            return Err(GridError::DimensionMismatch {
                name: "values".into(),
                expected: self.values.len(),
                got: values.len(),
            });
        }
        self.values = values;
        Ok(self)
    }

    /// Rename the variable, e.g. after deriving a new quantity.
    pub fn renamed(mut self, variable: impl Into<String>, units: Option<String>) -> GriddedDataset {
        self.variable = variable.into();
        self.units = units;
        self
    }

    pub(crate) fn into_parts(self) -> (String, Option<String>, Vec<MonthKey>, Coords, Array3<f64>) {
        (self.variable, self.units, self.times, self.coords, self.values)
    }

    pub(crate) fn from_parts(
        variable: String,
        units: Option<String>,
        times: Vec<MonthKey>,
        coords: Coords,
        values: Array3<f64>,
    ) -> Self {
        Self {
            variable,
            units,
            times,
            coords,
            values,
        }
    }
}

// ---------------------------------------------------------------------------
// LayeredDataset
// ---------------------------------------------------------------------------

/// A depth-resolved field over (time, level, latitude, longitude).
///
/// Only used by derived-variable pipelines (ocean heat content) whose source
/// variables carry a vertical axis; the surface-level types above cover
/// everything else.
#[derive(Debug, Clone)]
pub struct LayeredDataset {
    variable: String,
    units: Option<String>,
    times: Vec<MonthKey>,
    /// Depth of each level in metres, increasing downward.
    levels: Vec<f64>,
    coords: Coords,
    values: Array4<f64>,
}

impl LayeredDataset {
    /// Create a new layered dataset after validating axis lengths and that
    /// levels increase downward.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::DimensionMismatch`] on any axis length mismatch
    /// or non-increasing levels.
    pub fn new(
        variable: impl Into<String>,
        units: Option<String>,
        times: Vec<MonthKey>,
        levels: Vec<f64>,
        coords: Coords,
        values: Array4<f64>,
    ) -> Result<Self, GridError> {
        let (nt, nl, ny, nx) = values.dim();
        if nt != times.len() {
            return Err(GridError::DimensionMismatch {
                name: "time".into(),
                expected: times.len(),
                got: nt,
            });
        }
        if nl != levels.len() {
            return Err(GridError::DimensionMismatch {
                name: "lev".into(),
                expected: levels.len(),
                got: nl,
            });
        }
        if !levels.windows(2).all(|w| w[0] < w[1]) {
            return Err(GridError::DimensionMismatch {
                name: "lev".into(),
                expected: levels.len(),
                got: 0,
            });
        }
        let (cy, cx) = coords.shape();
        if ny != cy || nx != cx {
            return Err(GridError::DimensionMismatch {
                name: "lat/lon".into(),
                expected: cy * cx,
                got: ny * nx,
            });
        }
        Ok(Self {
            variable: variable.into(),
            units,
            times,
            levels,
            coords,
            values,
        })
    }

    /// Variable short name (e.g. "thetao").
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Physical units, when known.
    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    /// Monthly time axis.
    pub fn times(&self) -> &[MonthKey] {
        &self.times
    }

    /// Depth levels in metres.
    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    /// Spatial coordinates.
    pub fn coords(&self) -> &Coords {
        &self.coords
    }

    /// The value array, `(time, lev, y, x)`.
    pub fn values(&self) -> &Array4<f64> {
        &self.values
    }

    /// Subset to the inclusive month range `[start, end]`.
    pub fn select_period(&self, start: MonthKey, end: MonthKey) -> LayeredDataset {
        let idx: Vec<usize> = self
            .times
            .iter()
            .enumerate()
            .filter(|(_, t)| **t >= start && **t <= end)
            .map(|(i, _)| i)
            .collect();
        let times: Vec<MonthKey> = idx.iter().map(|&i| self.times[i]).collect();
        let values = self.values.select(Axis(0), &idx);
        LayeredDataset {
            variable: self.variable.clone(),
            units: self.units.clone(),
            times,
            levels: self.levels.clone(),
            coords: self.coords.clone(),
            values,
        }
    }

    /// Element-wise mean across members, as [`GriddedDataset::mean_of`].
    ///
    /// # Errors
    ///
    /// Returns [`GridError::DimensionMismatch`] when members disagree or the
    /// slice is empty.
    pub fn mean_of(members: &[LayeredDataset]) -> Result<LayeredDataset, GridError> {
        let first = members.first().ok_or_else(|| GridError::DimensionMismatch {
            name: "ensemble".into(),
            expected: 1,
            got: 0,
        })?;
        for m in &members[1..] {
            if m.values.dim() != first.values.dim() || m.times != first.times {
                return Err(GridError::DimensionMismatch {
                    name: "ensemble".into(),
                    expected: first.times.len(),
                    got: m.times.len(),
                });
            }
        }
        let mut acc = first.values.clone();
        for m in &members[1..] {
            acc += &m.values;
        }
        acc /= members.len() as f64;
        Ok(LayeredDataset {
            variable: first.variable.clone(),
            units: first.units.clone(),
            times: first.times.clone(),
            levels: first.levels.clone(),
            coords: first.coords.clone(),
            values: acc,
        })
    }

    #[allow(clippy::type_complexity)]
    pub(crate) fn into_parts(
        self,
    ) -> (
        String,
        Option<String>,
        Vec<MonthKey>,
        Vec<f64>,
        Coords,
        Array4<f64>,
    ) {
        (
            self.variable,
            self.units,
            self.times,
            self.levels,
            self.coords,
            self.values,
        )
    }

    pub(crate) fn from_parts(
        variable: String,
        units: Option<String>,
        times: Vec<MonthKey>,
        levels: Vec<f64>,
        coords: Coords,
        values: Array4<f64>,
    ) -> Self {
        Self {
            variable,
            units,
            times,
            levels,
            coords,
            values,
        }
    }

    /// Concatenate two layered datasets along time, `self` first.
    ///
    /// # Errors
    ///
    /// Same policy as [`GriddedDataset::concat_time`], plus the level axes
    /// must match exactly.
    pub fn concat_time(self, other: LayeredDataset) -> Result<LayeredDataset, GridError> {
        if self.levels != other.levels {
            return Err(GridError::DimensionMismatch {
                name: "lev".into(),
                expected: self.levels.len(),
                got: other.levels.len(),
            });
        }
        if self.coords.shape() != other.coords.shape() {
            return Err(GridError::DimensionMismatch {
                name: "lat/lon".into(),
                expected: self.coords.shape().0 * self.coords.shape().1,
                got: other.coords.shape().0 * other.coords.shape().1,
            });
        }
        if let (Some(last), Some(first)) = (self.times.last(), other.times.first()) {
            if first <= last {
                return Err(GridError::DimensionMismatch {
                    name: "time".into(),
                    expected: self.times.len() + other.times.len(),
                    got: self.times.len(),
                });
            }
        }
        let mut times = self.times;
        times.extend_from_slice(&other.times);
        let mut values = self.values;
        values
            .append(Axis(0), other.values.view())
            .map_err(|_| GridError::DimensionMismatch {
                name: "time".into(),
                expected: times.len(),
                got: values.dim().0,
            })?;
        Ok(LayeredDataset {
            variable: self.variable,
            units: self.units,
            times,
            levels: self.levels,
            coords: self.coords,
            values,
        })
    }
}
