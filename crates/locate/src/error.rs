//! Error types for cbench-locate.

use cbench_grid::GridError;
use cbench_io::IoError;
use cbench_store::StoreError;

/// Error type for all fallible operations in the cbench-locate crate.
#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    /// Returned when a dataset cannot be found through any configured
    /// source.
    #[error("dataset not found: {details}")]
    DatasetNotFound {
        /// The exhausted query, human readable.
        details: String,
    },

    /// Returned when a configured ensemble member has no data for the
    /// requested experiment. Expected for many models; bulk runs skip it.
    #[error("ensemble member '{member}' not found for model '{model}'")]
    EnsembleNotFound {
        /// Model name.
        model: String,
        /// Missing ensemble member id.
        member: String,
    },

    /// Returned when historical and projection segments cannot be joined
    /// into one monotone monthly series.
    #[error("time alignment error: {reason}")]
    TimeAlignment {
        /// Description of the seam problem.
        reason: String,
    },

    /// Returned when the catalogue manifest cannot be fetched or parsed.
    #[error("catalogue error: {reason}")]
    Catalogue {
        /// Description of the catalogue failure.
        reason: String,
    },

    /// Returned when a federated search request or download fails.
    #[error("federated search error: {reason}")]
    Search {
        /// Description of the search failure.
        reason: String,
    },

    /// Returned when a variable has no observation source registered.
    #[error("no observation source for variable '{variable}'{}", source_name.as_ref().map(|s| format!(" named '{s}'")).unwrap_or_default())]
    UnknownObservation {
        /// Variable short name.
        variable: String,
        /// Specific source requested, when any.
        source_name: Option<String>,
    },

    /// Wraps a file reading or writing failure.
    #[error(transparent)]
    Io(#[from] IoError),

    /// Wraps a dataset construction or standardization failure.
    #[error(transparent)]
    Grid(#[from] GridError),

    /// Wraps an object-store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}
