//! # cbench-grid
//!
//! Canonical in-memory model for gridded monthly climate data and the
//! coordinate standardizer that every dataset passes through at load time.
//! Datasets are `ndarray`-backed fields over (time, y, x), with an optional
//! vertical axis for depth-resolved ocean variables.

mod dataset;
mod error;
mod month;
mod standardize;
mod weights;

pub use dataset::{Coords, GriddedDataset, LayeredDataset};
pub use error::GridError;
pub use month::{MonthKey, is_strictly_increasing};
pub use standardize::{
    LAT_ALIASES, LEVEL_ALIASES, LON_ALIASES, StandardizeOptions, TIME_ALIASES, standardize,
    standardize_layered,
};
pub use weights::CellAreaWeights;
