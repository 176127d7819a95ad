use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use cbench_grid::MonthKey;
use cbench_locate::{FinderConfig, ObservationSpec, DEFAULT_INDEX_URL};

/// Top-level cbench configuration.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct CbenchConfig {
    /// Evaluation periods.
    #[serde(default)]
    pub periods: PeriodsToml,

    /// Data source settings.
    #[serde(default)]
    pub data: DataToml,

    /// Ensemble settings.
    #[serde(default)]
    pub ensemble: EnsembleToml,

    /// Results destination settings.
    #[serde(default)]
    pub store: StoreToml,

    /// Observation source overrides: `[observations.<variable>.<source>]`.
    #[serde(default)]
    pub observations: BTreeMap<String, BTreeMap<String, ObservationSpec>>,

    /// Bulk run settings.
    #[serde(default)]
    pub bulk: BulkToml,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeriodsToml {
    #[serde(default = "default_historical_start")]
    pub historical_start: i32,
    #[serde(default = "default_historical_end")]
    pub historical_end: i32,
    #[serde(default = "default_projection_start")]
    pub projection_start: i32,
    #[serde(default = "default_projection_end")]
    pub projection_end: i32,
    #[serde(default = "default_projection_experiment")]
    pub projection_experiment: String,
}

impl Default for PeriodsToml {
    fn default() -> Self {
        Self {
            historical_start: default_historical_start(),
            historical_end: default_historical_end(),
            projection_start: default_projection_start(),
            projection_end: default_projection_end(),
            projection_experiment: default_projection_experiment(),
        }
    }
}

fn default_historical_start() -> i32 {
    1960
}
fn default_historical_end() -> i32 {
    2014
}
fn default_projection_start() -> i32 {
    2015
}
fn default_projection_end() -> i32 {
    2024
}
fn default_projection_experiment() -> String {
    "ssp245".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataToml {
    /// Root of the local cache of downloaded model output.
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,
    /// URL of the archive catalogue manifest.
    #[serde(default = "default_catalogue_url")]
    pub catalogue_url: String,
    /// Where the downloaded manifest is cached. Defaults to
    /// `<cache_root>/catalogue.csv`.
    #[serde(default)]
    pub catalogue_cache: Option<PathBuf>,
    /// Federated search endpoint.
    #[serde(default = "default_search_url")]
    pub search_url: String,
    /// Snap coordinates to ideal cell centres during standardization.
    #[serde(default = "default_true")]
    pub snap_coordinates: bool,
}

impl Default for DataToml {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            catalogue_url: default_catalogue_url(),
            catalogue_cache: None,
            search_url: default_search_url(),
            snap_coordinates: true,
        }
    }
}

impl DataToml {
    /// Manifest cache path, explicit or derived from the cache root.
    pub fn catalogue_cache_path(&self) -> PathBuf {
        self.catalogue_cache
            .clone()
            .unwrap_or_else(|| self.cache_root.join("catalogue.csv"))
    }
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("climate_data")
}
fn default_catalogue_url() -> String {
    "https://cmip6.storage.googleapis.com/pangeo-cmip6.csv".to_string()
}
fn default_search_url() -> String {
    DEFAULT_INDEX_URL.to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnsembleToml {
    #[serde(default = "default_members")]
    pub members: Vec<String>,
}

impl Default for EnsembleToml {
    fn default() -> Self {
        Self {
            members: default_members(),
        }
    }
}

fn default_members() -> Vec<String> {
    vec![
        "r1i1p1f1".to_string(),
        "r2i1p1f1".to_string(),
        "r3i1p1f1".to_string(),
    ]
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreToml {
    /// Directory results are written under.
    #[serde(default = "default_store_root")]
    pub root: PathBuf,
}

impl Default for StoreToml {
    fn default() -> Self {
        Self {
            root: default_store_root(),
        }
    }
}

fn default_store_root() -> PathBuf {
    PathBuf::from("results")
}

/// One (institution, model, variable) combination for bulk runs.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BulkModelToml {
    pub org: String,
    pub model: String,
    pub variable: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct BulkToml {
    /// Combinations to benchmark.
    #[serde(default)]
    pub models: Vec<BulkModelToml>,
    /// Metric names computed per combination.
    #[serde(default = "default_bulk_metrics")]
    pub metrics: Vec<String>,
    /// Adjustment names computed per metric.
    #[serde(default = "default_bulk_adjustments")]
    pub adjustments: Vec<String>,
}

fn default_bulk_metrics() -> Vec<String> {
    vec!["rmse".to_string()]
}
fn default_bulk_adjustments() -> Vec<String> {
    vec!["none".to_string()]
}

impl CbenchConfig {
    /// The finder configuration implied by the `[periods]`, `[ensemble]`
    /// and `[data]` sections.
    pub fn finder_config(&self) -> FinderConfig {
        FinderConfig {
            historical_start: MonthKey::first(self.periods.historical_start),
            historical_end: MonthKey::last(self.periods.historical_end),
            projection_start: MonthKey::first(self.periods.projection_start),
            projection_end: MonthKey::last(self.periods.projection_end),
            projection_experiment: self.periods.projection_experiment.clone(),
            ensemble_members: self.ensemble.members.clone(),
            snap_coordinates: self.data.snap_coordinates,
        }
    }

    /// Destination label results are grouped under.
    pub fn experiment_label(&self) -> &str {
        if self.periods.projection_end >= self.periods.projection_start {
            &self.periods.projection_experiment
        } else {
            "historical"
        }
    }
}
