//! # cbench-io
//!
//! Read CMIP6 and observational NetCDF files into the in-memory dataset
//! types and write result grids back out. Handles coordinate-name aliases,
//! CF time decoding under model calendars, and fill-value masking.

mod error;
mod read;
mod time_decode;
mod write;

pub use error::IoError;
pub use read::{read_cell_area, read_dataset, read_layered_dataset};
pub use time_decode::{days_since_1850, decode_times, CfCalendar, TimeUnits};
pub use write::write_dataset;
