//! Dataset resolution: where does one (model, member, variable) live?
//!
//! Sources are tried in order. A local cache of downloaded files is checked
//! first, then the archive catalogue, then a federated search across data
//! nodes as the slowest last resort. Each source answers "not here" with
//! `Ok(None)` so the chain can move on; only real failures abort the chain.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::catalogue::{Catalogue, CatalogueFilter};
use crate::error::LocateError;

/// A fully qualified dataset request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataQuery {
    /// MIP activity, e.g. "CMIP" or "ScenarioMIP".
    pub activity: String,
    /// Institution that ran the model. Empty matches any on sources that
    /// can wildcard it.
    pub institution: String,
    /// Model name.
    pub model: String,
    /// Experiment, e.g. "historical" or "ssp245".
    pub experiment: String,
    /// Ensemble member id.
    pub member: String,
    /// Frequency table, e.g. "Amon".
    pub table: String,
    /// Variable short name.
    pub variable: String,
    /// Grid label.
    pub grid: String,
}

impl std::fmt::Display for DataQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}/{}/{}",
            self.activity,
            self.model,
            self.experiment,
            self.member,
            self.table,
            self.variable,
            self.grid
        )
    }
}

/// Where a resolved dataset lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// One or more netCDF files on the local filesystem, sorted so that
    /// time-split segments concatenate in order.
    LocalFiles(Vec<PathBuf>),
    /// A key in the configured object store.
    StoreObject(String),
}

/// One source of datasets.
pub trait Resolver: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &str;

    /// Try to locate the dataset. `Ok(None)` means this source does not
    /// have it and the next one should be asked.
    fn resolve(&self, query: &DataQuery) -> Result<Option<Location>, LocateError>;

    /// Like [`Resolver::resolve`] but allowed to ignore the member,
    /// activity and experiment constraints. Used for cell-area fields,
    /// which are published once per model under arbitrary members.
    fn resolve_relaxed(&self, query: &DataQuery) -> Result<Option<Location>, LocateError> {
        self.resolve(query)
    }

    /// Ensemble member ids this source has for the query, ignoring the
    /// query's own member field. Sources without member discovery return
    /// an empty list.
    fn members(&self, _query: &DataQuery) -> Result<Vec<String>, LocateError> {
        Ok(Vec::new())
    }
}

/// Ask each resolver in turn.
///
/// # Errors
///
/// Returns [`LocateError::DatasetNotFound`] when every source answers
/// `Ok(None)`, or the first hard failure from a source.
pub fn resolve_chain(
    resolvers: &[Box<dyn Resolver>],
    query: &DataQuery,
) -> Result<Location, LocateError> {
    for resolver in resolvers {
        debug!(source = resolver.name(), query = %query, "resolving");
        if let Some(location) = resolver.resolve(query)? {
            info!(source = resolver.name(), query = %query, "resolved");
            return Ok(location);
        }
    }
    Err(LocateError::DatasetNotFound {
        details: query.to_string(),
    })
}

/// Local directory of previously downloaded data, laid out as
/// `root/CMIP6/{activity}/{institution}/{model}/{experiment}/{member}/{table}/{variable}/...`
/// with the netCDF files at any depth below the variable directory.
#[derive(Debug)]
pub struct LocalCache {
    root: PathBuf,
}

impl LocalCache {
    /// A cache rooted at `root`. The directory need not exist yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory a query's files belong under. Downloads land here too.
    pub fn dataset_dir(&self, query: &DataQuery) -> PathBuf {
        self.root
            .join("CMIP6")
            .join(&query.activity)
            .join(&query.institution)
            .join(&query.model)
            .join(&query.experiment)
            .join(&query.member)
            .join(&query.table)
            .join(&query.variable)
    }

    fn collect_nc(dir: &Path, found: &mut Vec<PathBuf>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                Self::collect_nc(&path, found)?;
            } else if path.extension().is_some_and(|e| e == "nc") {
                found.push(path);
            }
        }
        Ok(())
    }
}

impl Resolver for LocalCache {
    fn name(&self) -> &str {
        "local-cache"
    }

    fn resolve(&self, query: &DataQuery) -> Result<Option<Location>, LocateError> {
        let dir = self.dataset_dir(query);
        if !dir.is_dir() {
            return Ok(None);
        }
        let mut files = Vec::new();
        Self::collect_nc(&dir, &mut files).map_err(|e| LocateError::Search {
            reason: format!("failed to scan {}: {e}", dir.display()),
        })?;
        if files.is_empty() {
            return Ok(None);
        }
        files.sort();
        Ok(Some(Location::LocalFiles(files)))
    }

    fn members(&self, query: &DataQuery) -> Result<Vec<String>, LocateError> {
        let experiment_dir = self
            .root
            .join("CMIP6")
            .join(&query.activity)
            .join(&query.institution)
            .join(&query.model)
            .join(&query.experiment);
        if !experiment_dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&experiment_dir).map_err(|e| LocateError::Search {
            reason: format!("failed to scan {}: {e}", experiment_dir.display()),
        })?;
        let mut members = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| LocateError::Search {
                reason: format!("failed to scan {}: {e}", experiment_dir.display()),
            })?;
            let has_variable = entry.path().join(&query.table).join(&query.variable).is_dir();
            if has_variable {
                if let Ok(name) = entry.file_name().into_string() {
                    members.push(name);
                }
            }
        }
        members.sort();
        Ok(members)
    }
}

/// The archive catalogue: a parsed manifest mapping queries to object-store
/// keys.
#[derive(Debug)]
pub struct CatalogueSource {
    catalogue: Catalogue,
}

impl CatalogueSource {
    /// A source over an already loaded catalogue.
    pub fn new(catalogue: Catalogue) -> Self {
        Self { catalogue }
    }

    /// Access to the underlying catalogue.
    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }
}

impl Resolver for CatalogueSource {
    fn name(&self) -> &str {
        "catalogue"
    }

    fn resolve(&self, query: &DataQuery) -> Result<Option<Location>, LocateError> {
        let filter = CatalogueFilter {
            activity_id: Some(query.activity.clone()),
            source_id: Some(query.model.clone()),
            experiment_id: Some(query.experiment.clone()),
            member_id: Some(query.member.clone()),
            table_id: Some(query.table.clone()),
            variable_id: Some(query.variable.clone()),
            grid_label: Some(query.grid.clone()),
        };
        Ok(self
            .catalogue
            .search(&filter)
            .first()
            .map(|e| Location::StoreObject(e.zstore.clone())))
    }

    /// Cell-area fields are published once per model, often under a
    /// different member or experiment than the data itself, so the relaxed
    /// search drops those constraints.
    fn resolve_relaxed(&self, query: &DataQuery) -> Result<Option<Location>, LocateError> {
        let filter = CatalogueFilter {
            source_id: Some(query.model.clone()),
            table_id: Some(query.table.clone()),
            variable_id: Some(query.variable.clone()),
            grid_label: Some(query.grid.clone()),
            ..CatalogueFilter::default()
        };
        Ok(self
            .catalogue
            .search(&filter)
            .first()
            .map(|e| Location::StoreObject(e.zstore.clone())))
    }

    fn members(&self, query: &DataQuery) -> Result<Vec<String>, LocateError> {
        let filter = CatalogueFilter {
            activity_id: Some(query.activity.clone()),
            source_id: Some(query.model.clone()),
            experiment_id: Some(query.experiment.clone()),
            table_id: Some(query.table.clone()),
            variable_id: Some(query.variable.clone()),
            grid_label: Some(query.grid.clone()),
            ..CatalogueFilter::default()
        };
        Ok(self.catalogue.find_members(&filter))
    }
}
