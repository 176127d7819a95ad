//! Error types for cbench-io.

use std::path::PathBuf;

use cbench_grid::GridError;

/// Error type for all fallible operations in the cbench-io crate.
///
/// Covers missing files and variables, NetCDF library failures, CF time
/// decoding problems, and grid construction errors surfaced while bridging
/// file contents into the in-memory dataset types.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when a required file does not exist on disk.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path that could not be found.
        path: PathBuf,
    },

    /// Wraps an error originating from the NetCDF library.
    #[error("netcdf error: {reason}")]
    Netcdf {
        /// Description of the underlying NetCDF failure.
        reason: String,
    },

    /// Returned when a required variable is not present in a file.
    #[error("variable '{name}' not found in {}", path.display())]
    MissingVariable {
        /// Name of the missing variable.
        name: String,
        /// Path to the file that was inspected.
        path: PathBuf,
    },

    /// Returned when a variable has an unexpected number of dimensions.
    #[error("variable '{name}': expected {expected} dimensions, got {got}")]
    UnexpectedRank {
        /// Name of the variable.
        name: String,
        /// Expected number of dimensions.
        expected: usize,
        /// Actual number of dimensions.
        got: usize,
    },

    /// Returned when a time axis cannot be decoded from its CF metadata.
    #[error("invalid time: {reason}")]
    InvalidTime {
        /// Description of the time decoding issue.
        reason: String,
    },

    /// Wraps an error from constructing the in-memory dataset, including
    /// unidentifiable coordinates.
    #[error(transparent)]
    Grid(#[from] GridError),
}

impl From<netcdf::Error> for IoError {
    fn from(e: netcdf::Error) -> Self {
        IoError::Netcdf {
            reason: e.to_string(),
        }
    }
}
