//! # cbench-store
//!
//! Result persistence: a destination-agnostic object store abstraction, the
//! append-or-update scalar results table, and the writer that routes metric
//! results to their objects.

mod error;
mod object_store;
mod table;
mod writer;

pub use error::StoreError;
pub use object_store::{LocalStore, MemoryStore, ObjectStore};
pub use table::{ResultRow, ResultsTable, KEY_COLUMNS};
pub use writer::ResultsWriter;
