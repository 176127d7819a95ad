//! The CMIP6 holdings catalogue.
//!
//! A single CSV manifest lists every dataset in the archive's object store,
//! one row per (model, experiment, member, variable, version). The manifest
//! is downloaded once and cached on disk; reading it from the network every
//! run is far too slow.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{Array, Int64Array, StringArray};
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::DataType;
use tracing::{debug, info};

use crate::error::LocateError;

/// One manifest row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogueEntry {
    /// MIP activity, e.g. "CMIP" or "ScenarioMIP".
    pub activity_id: String,
    /// Institution that ran the model.
    pub institution_id: String,
    /// Model name.
    pub source_id: String,
    /// Experiment, e.g. "historical" or "ssp245".
    pub experiment_id: String,
    /// Ensemble member id, e.g. "r1i1p1f1".
    pub member_id: String,
    /// Frequency table, e.g. "Amon", "Omon", "fx", "Ofx".
    pub table_id: String,
    /// Variable short name.
    pub variable_id: String,
    /// Grid label, e.g. "gn" or "gr".
    pub grid_label: String,
    /// Object-store key of the dataset.
    pub zstore: String,
    /// Publication version as YYYYMMDD.
    pub version: i64,
}

/// Search filter over the manifest. `None` fields match anything.
#[derive(Debug, Clone, Default)]
pub struct CatalogueFilter {
    /// MIP activity.
    pub activity_id: Option<String>,
    /// Model name.
    pub source_id: Option<String>,
    /// Experiment id.
    pub experiment_id: Option<String>,
    /// Ensemble member id.
    pub member_id: Option<String>,
    /// Frequency table.
    pub table_id: Option<String>,
    /// Variable short name.
    pub variable_id: Option<String>,
    /// Grid label.
    pub grid_label: Option<String>,
}

impl CatalogueFilter {
    fn matches(&self, entry: &CatalogueEntry) -> bool {
        let field = |want: &Option<String>, have: &str| {
            want.as_deref().map_or(true, |w| w == have)
        };
        field(&self.activity_id, &entry.activity_id)
            && field(&self.source_id, &entry.source_id)
            && field(&self.experiment_id, &entry.experiment_id)
            && field(&self.member_id, &entry.member_id)
            && field(&self.table_id, &entry.table_id)
            && field(&self.variable_id, &entry.variable_id)
            && field(&self.grid_label, &entry.grid_label)
    }
}

/// Parsed manifest with search and version-dedup operations.
#[derive(Debug, Default)]
pub struct Catalogue {
    entries: Vec<CatalogueEntry>,
}

impl Catalogue {
    /// Build a catalogue from rows directly (tests, fakes).
    pub fn from_entries(entries: Vec<CatalogueEntry>) -> Self {
        Self { entries }
    }

    /// Parse the manifest CSV.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::Catalogue`] when the CSV is malformed or a
    /// required column is missing.
    pub fn from_csv(bytes: &[u8]) -> Result<Self, LocateError> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        let cat_err = |reason: String| LocateError::Catalogue { reason };
        let format = Format::default().with_header(true);
        let (schema, _) = format
            .infer_schema(Cursor::new(bytes), None)
            .map_err(|e| cat_err(e.to_string()))?;
        let reader = ReaderBuilder::new(Arc::new(schema))
            .with_header(true)
            .build(Cursor::new(bytes))
            .map_err(|e| cat_err(e.to_string()))?;

        let mut entries = Vec::new();
        for batch in reader {
            let batch = batch.map_err(|e| cat_err(e.to_string()))?;
            let text = |name: &str| -> Result<&StringArray, LocateError> {
                batch
                    .column_by_name(name)
                    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                    .ok_or_else(|| cat_err(format!("missing column '{name}'")))
            };
            let activity = text("activity_id")?;
            let institution = text("institution_id")?;
            let source = text("source_id")?;
            let experiment = text("experiment_id")?;
            let member = text("member_id")?;
            let table = text("table_id")?;
            let variable = text("variable_id")?;
            let grid = text("grid_label")?;
            let zstore = text("zstore")?;
            let version_col = batch
                .column_by_name("version")
                .ok_or_else(|| cat_err("missing column 'version'".to_string()))?;
            let version = arrow::compute::cast(version_col, &DataType::Int64)
                .map_err(|e| cat_err(e.to_string()))?;
            let version = version
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| cat_err("column 'version' is not numeric".to_string()))?
                .clone();

            for i in 0..batch.num_rows() {
                entries.push(CatalogueEntry {
                    activity_id: activity.value(i).to_string(),
                    institution_id: institution.value(i).to_string(),
                    source_id: source.value(i).to_string(),
                    experiment_id: experiment.value(i).to_string(),
                    member_id: member.value(i).to_string(),
                    table_id: table.value(i).to_string(),
                    variable_id: variable.value(i).to_string(),
                    grid_label: grid.value(i).to_string(),
                    zstore: zstore.value(i).to_string(),
                    version: if version.is_valid(i) { version.value(i) } else { 0 },
                });
            }
        }
        debug!(n = entries.len(), "parsed catalogue manifest");
        Ok(Self { entries })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalogue holds no rows.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Matching entries with duplicates collapsed: when a member appears
    /// under several publication versions only the newest survives.
    pub fn search(&self, filter: &CatalogueFilter) -> Vec<&CatalogueEntry> {
        let mut newest: BTreeMap<(&str, &str, &str, &str), &CatalogueEntry> = BTreeMap::new();
        for entry in self.entries.iter().filter(|e| filter.matches(e)) {
            let key = (
                entry.experiment_id.as_str(),
                entry.member_id.as_str(),
                entry.table_id.as_str(),
                entry.variable_id.as_str(),
            );
            match newest.get(&key) {
                Some(existing) if existing.version >= entry.version => {}
                _ => {
                    newest.insert(key, entry);
                }
            }
        }
        newest.into_values().collect()
    }

    /// Ensemble member ids available for a (model, experiment, variable)
    /// combination, restricted to the physics/forcing family `i1p1f1` as the
    /// benchmark convention requires, sorted.
    pub fn find_members(&self, filter: &CatalogueFilter) -> Vec<String> {
        let mut members: Vec<String> = self
            .search(filter)
            .into_iter()
            .filter(|e| e.member_id.contains("i1p1f1"))
            .map(|e| e.member_id.clone())
            .collect();
        members.sort();
        members.dedup();
        members
    }
}

/// Fetches the manifest over HTTP, keeping a disk cache.
#[derive(Debug)]
pub struct CatalogueFetcher {
    url: String,
    cache_path: PathBuf,
}

impl CatalogueFetcher {
    /// A fetcher for `url`, caching the downloaded manifest at
    /// `cache_path`.
    pub fn new(url: impl Into<String>, cache_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            cache_path: cache_path.into(),
        }
    }

    /// Load the manifest, preferring the disk cache.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::Catalogue`] on download or parse failure.
    pub fn fetch(&self) -> Result<Catalogue, LocateError> {
        if self.cache_path.exists() {
            debug!(path = %self.cache_path.display(), "reading cached catalogue");
            let bytes = std::fs::read(&self.cache_path).map_err(|e| LocateError::Catalogue {
                reason: format!("failed to read cache {}: {e}", self.cache_path.display()),
            })?;
            return Catalogue::from_csv(&bytes);
        }

        info!(url = %self.url, "downloading catalogue manifest");
        let response = reqwest::blocking::get(&self.url)
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| LocateError::Catalogue {
                reason: format!("failed to download {}: {e}", self.url),
            })?;
        let bytes = response.bytes().map_err(|e| LocateError::Catalogue {
            reason: format!("failed to read manifest body: {e}"),
        })?;
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LocateError::Catalogue {
                reason: format!("failed to create cache dir: {e}"),
            })?;
        }
        std::fs::write(&self.cache_path, &bytes).map_err(|e| LocateError::Catalogue {
            reason: format!("failed to write cache: {e}"),
        })?;
        Catalogue::from_csv(&bytes)
    }
}
