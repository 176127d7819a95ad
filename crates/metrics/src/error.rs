//! Error types for cbench-metrics.

/// Error type for all fallible operations in the cbench-metrics crate.
///
/// Metric calculation is pure: every failure is a property of the inputs,
/// reported before any arithmetic happens.
#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    /// Returned when a latitude band is inverted, leaves [-90, 90], or
    /// selects no grid cells.
    #[error("invalid latitude bounds: [{lat_min}, {lat_max}]")]
    InvalidBounds {
        /// Lower latitude bound.
        lat_min: f64,
        /// Upper latitude bound.
        lat_max: f64,
    },

    /// Returned when model and observations share no month in the requested
    /// period.
    #[error("no overlapping months between model and observations")]
    EmptyOverlap,

    /// Returned when model and observation grids differ in shape. There is
    /// no regridding here; inputs must already be on a common grid.
    #[error("grid shape mismatch: model {model:?}, observations {obs:?}")]
    ShapeMismatch {
        /// Model grid shape (rows, columns).
        model: (usize, usize),
        /// Observation grid shape (rows, columns).
        obs: (usize, usize),
    },

    /// Returned when an ensemble metric is requested with fewer than two
    /// member series.
    #[error("metric requires an ensemble of at least 2 members, got {got}")]
    EnsembleRequired {
        /// Number of member series provided.
        got: usize,
    },

    /// Returned for metric/reduction combinations that are not defined.
    #[error("unsupported combination: {details}")]
    Unsupported {
        /// Description of the unsupported request.
        details: String,
    },
}
