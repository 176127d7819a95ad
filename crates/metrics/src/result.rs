//! Metric request vocabulary and the immutable result record.

use std::fmt;
use std::str::FromStr;

use cbench_grid::{Coords, MonthKey};
use ndarray::Array2;

use crate::error::MetricError;

/// Which skill metric to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Root mean square error.
    Rmse,
    /// Mean absolute error.
    Mae,
    /// Continuous ranked probability score (ensemble).
    Crps,
}

impl MetricKind {
    /// Stable lowercase name, used in result tables and file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Rmse => "rmse",
            MetricKind::Mae => "mae",
            MetricKind::Crps => "crps",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rmse" => Ok(MetricKind::Rmse),
            "mae" => Ok(MetricKind::Mae),
            "crps" => Ok(MetricKind::Crps),
            other => Err(MetricError::Unsupported {
                details: format!("unknown metric '{other}'"),
            }),
        }
    }
}

/// How to reduce the (time, y, x) error field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reduction {
    /// Reduce space first (area-weighted zonal mean), then time: one scalar.
    ZonalMean,
    /// Reduce space per time step: a monthly series.
    Spatial,
    /// Reduce time per cell: a gridded map.
    Temporal,
}

impl Reduction {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Reduction::ZonalMean => "zonal_mean",
            Reduction::Spatial => "spatial",
            Reduction::Temporal => "temporal",
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reduction {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zonal_mean" => Ok(Reduction::ZonalMean),
            "spatial" => Ok(Reduction::Spatial),
            "temporal" => Ok(Reduction::Temporal),
            other => Err(MetricError::Unsupported {
                details: format!("unknown reduction '{other}'"),
            }),
        }
    }
}

/// Pre-metric adjustment applied to the compared fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Adjustment {
    /// Compare raw fields.
    #[default]
    None,
    /// Remove the constant model-minus-observation offset over the overlap
    /// before comparing, so only variability errors remain.
    BiasAdjusted,
    /// Compare anomalies: each dataset has its own per-calendar-month
    /// climatology subtracted, removing the seasonal cycle.
    Anomaly,
}

impl Adjustment {
    /// Stable lowercase name, used in result tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            Adjustment::None => "none",
            Adjustment::BiasAdjusted => "bias_adjusted",
            Adjustment::Anomaly => "anomaly",
        }
    }
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Adjustment {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Adjustment::None),
            "bias_adjusted" => Ok(Adjustment::BiasAdjusted),
            "anomaly" => Ok(Adjustment::Anomaly),
            other => Err(MetricError::Unsupported {
                details: format!("unknown adjustment '{other}'"),
            }),
        }
    }
}

/// An evaluation window in whole years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Period {
    /// First year, inclusive.
    pub start_year: i32,
    /// Last year, inclusive.
    pub end_year: i32,
}

impl Period {
    /// First month of the window.
    pub fn start(&self) -> Result<MonthKey, cbench_grid::GridError> {
        MonthKey::new(self.start_year, 1)
    }

    /// Last month of the window.
    pub fn end(&self) -> Result<MonthKey, cbench_grid::GridError> {
        MonthKey::new(self.end_year, 12)
    }

    /// Column label, e.g. "2005-2014".
    pub fn label(&self) -> String {
        format!("{}-{}", self.start_year, self.end_year)
    }
}

/// The computed value: shape depends on the reduction.
#[derive(Debug, Clone)]
pub enum MetricValue {
    /// One number for the whole window (zonal-mean reduction).
    Scalar(f64),
    /// One number per time step (spatial reduction).
    Series(Vec<(MonthKey, f64)>),
    /// One number per grid cell (temporal reduction).
    Map {
        /// Grid the map is on.
        coords: Coords,
        /// Per-cell metric values, NaN where no valid data.
        values: Array2<f64>,
    },
}

/// An immutable record of one computed metric.
#[derive(Debug, Clone)]
pub struct MetricResult {
    /// Model name.
    pub model: String,
    /// Variable short name.
    pub variable: String,
    /// Which metric.
    pub metric: MetricKind,
    /// Which reduction produced the value.
    pub reduction: Reduction,
    /// Which adjustment was applied.
    pub adjustment: Adjustment,
    /// Latitude band the metric was computed over.
    pub lat_min: f64,
    /// Upper latitude bound.
    pub lat_max: f64,
    /// Evaluation window.
    pub period: Period,
    /// The computed value.
    pub value: MetricValue,
}

impl MetricResult {
    /// Region label derived from the latitude band, used as a table key.
    pub fn region_label(&self) -> String {
        if self.lat_min <= -90.0 && self.lat_max >= 90.0 {
            "global".to_string()
        } else {
            format!("lat_{:.0}_{:.0}", self.lat_min, self.lat_max)
        }
    }
}
