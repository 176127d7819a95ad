//! Error types for cbench-grid.

/// Error type for all fallible operations on gridded datasets.
///
/// Covers coordinate identification failures, dimension mismatches between
/// coordinate arrays and data arrays, invalid time keys, and invalid cell
/// area weights.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    /// Returned when coordinate variables cannot be identified after
    /// exhausting the known-name alias tables. Fatal for the calling
    /// benchmark; there is no silent fallback.
    #[error("unsupported grid: {details}")]
    UnsupportedGrid {
        /// Description of what could not be identified.
        details: String,
    },

    /// Returned when a coordinate or data dimension has an unexpected size.
    #[error("dimension '{name}' mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Name of the dimension.
        name: String,
        /// Expected size.
        expected: usize,
        /// Actual size.
        got: usize,
    },

    /// Returned when a calendar month is outside 1..=12.
    #[error("invalid month: {month} (must be 1..=12)")]
    InvalidMonth {
        /// The offending month number.
        month: u32,
    },

    /// Returned when cell area weights violate their invariants
    /// (negative, non-finite, or zero-sum).
    #[error("invalid cell area weights: {reason}")]
    InvalidWeights {
        /// Description of the violated invariant.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unsupported_grid() {
        let err = GridError::UnsupportedGrid {
            details: "no latitude variable".to_string(),
        };
        assert_eq!(err.to_string(), "unsupported grid: no latitude variable");
    }

    #[test]
    fn display_dimension_mismatch() {
        let err = GridError::DimensionMismatch {
            name: "lat".to_string(),
            expected: 90,
            got: 45,
        };
        assert_eq!(err.to_string(), "dimension 'lat' mismatch: expected 90, got 45");
    }

    #[test]
    fn display_invalid_month() {
        let err = GridError::InvalidMonth { month: 13 };
        assert_eq!(err.to_string(), "invalid month: 13 (must be 1..=12)");
    }

    #[test]
    fn display_invalid_weights() {
        let err = GridError::InvalidWeights {
            reason: "sum is zero".to_string(),
        };
        assert_eq!(err.to_string(), "invalid cell area weights: sum is zero");
    }

    #[test]
    fn error_is_send_sync_and_std_error() {
        fn assert_bounds<T: Send + Sync + std::error::Error>() {}
        assert_bounds::<GridError>();
    }
}
