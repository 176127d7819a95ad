//! # cbench-locate
//!
//! Finds the datasets the benchmark needs. Model output is resolved through
//! a chain of sources (local cache, archive catalogue, federated search),
//! historical and scenario runs are joined into one monthly series, and
//! observations come from a per-variable registry. Ocean heat content is
//! derived here from temperature and salinity columns.

mod catalogue;
mod derived;
mod error;
mod esgf;
mod finder;
mod registry;
mod resolver;

pub use catalogue::{Catalogue, CatalogueEntry, CatalogueFetcher, CatalogueFilter};
pub use derived::{classify, ocean_heat_content, OceanLayer, VariableKind};
pub use error::LocateError;
pub use esgf::{EsgfClient, FederatedSearch, RemoteFile, DEFAULT_INDEX_URL};
pub use finder::{
    cell_area_field, grid_label, variable_table, DataFinder, FinderConfig, ModelSpec,
};
pub use registry::{ObservationRegistry, ObservationSpec};
pub use resolver::{resolve_chain, CatalogueSource, DataQuery, LocalCache, Location, Resolver};
