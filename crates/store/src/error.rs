//! Error types for cbench-store.

/// Error type for all fallible operations in the cbench-store crate.
///
/// Covers object-store access failures, CSV table parsing, result rows that
/// cannot be tabulated, and staging errors while serializing gridded
/// results.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Returned when a requested object does not exist in the store.
    #[error("object not found: {key}")]
    ObjectNotFound {
        /// Store key that was requested.
        key: String,
    },

    /// Wraps a filesystem failure from the local store backend.
    #[error("store i/o error at '{key}': {reason}")]
    Io {
        /// Store key being accessed.
        key: String,
        /// Description of the underlying failure.
        reason: String,
    },

    /// Returned when the results table CSV cannot be parsed or written.
    #[error("results table error: {reason}")]
    Table {
        /// Description of the table failure.
        reason: String,
    },

    /// Returned when a metric result cannot be represented as a table row.
    #[error("result is not tabulatable: {reason}")]
    InvalidRow {
        /// Why the result does not fit the table.
        reason: String,
    },

    /// Wraps a failure while staging a gridded result to NetCDF.
    #[error("grid staging error: {reason}")]
    Staging {
        /// Description of the staging failure.
        reason: String,
    },
}

impl From<arrow::error::ArrowError> for StoreError {
    fn from(e: arrow::error::ArrowError) -> Self {
        StoreError::Table {
            reason: e.to_string(),
        }
    }
}
