//! High-level dataset loading for the benchmark.
//!
//! Wraps the resolver chain with the benchmark's conventions: which
//! frequency table a variable lives in, which ensemble members to load,
//! how the historical and projection experiments join into one monthly
//! series, and where the reference observations come from.

use std::path::Path;
use std::sync::Arc;

use cbench_grid::{
    standardize, standardize_layered, CellAreaWeights, GriddedDataset, LayeredDataset, MonthKey,
    StandardizeOptions,
};
use cbench_io::{read_cell_area, read_dataset, read_layered_dataset};
use cbench_store::ObjectStore;
use tracing::{debug, info, warn};

use crate::derived::{ocean_heat_content, OceanLayer};
use crate::error::LocateError;
use crate::registry::ObservationRegistry;
use crate::resolver::{resolve_chain, DataQuery, Location, Resolver};

/// Frequency table a variable is published under.
pub fn variable_table(variable: &str) -> &'static str {
    match variable {
        "tos" | "thetao" | "so" => "Omon",
        "od550aer" => "AERmon",
        _ => "Amon",
    }
}

/// Grid label convention: ocean fields are requested on the regridded
/// product, everything else on the native grid.
pub fn grid_label(table: &str) -> &'static str {
    if table == "Omon" {
        "gr"
    } else {
        "gn"
    }
}

/// (cell-area variable, fixed-field table) for a frequency table.
pub fn cell_area_field(table: &str) -> (&'static str, &'static str) {
    if table == "Omon" {
        ("areacello", "Ofx")
    } else {
        ("areacella", "fx")
    }
}

/// One model to benchmark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// Institution id, e.g. "CSIRO-ARCCSS".
    pub institution: String,
    /// Model name, e.g. "ACCESS-CM2".
    pub model: String,
}

/// Periods, experiments and members the finder loads.
#[derive(Debug, Clone)]
pub struct FinderConfig {
    /// First month of the historical segment.
    pub historical_start: MonthKey,
    /// Last month of the historical segment.
    pub historical_end: MonthKey,
    /// First month of the projection segment.
    pub projection_start: MonthKey,
    /// Last month of the projection segment. Before `projection_start`
    /// disables the projection segment entirely.
    pub projection_end: MonthKey,
    /// Scenario experiment joined after the historical run.
    pub projection_experiment: String,
    /// Ensemble members loaded for each model.
    pub ensemble_members: Vec<String>,
    /// Snap coordinates to ideal cell centres during standardization.
    pub snap_coordinates: bool,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            historical_start: MonthKey::first(1960),
            historical_end: MonthKey::last(2014),
            projection_start: MonthKey::first(2015),
            projection_end: MonthKey::last(2024),
            projection_experiment: "ssp245".to_string(),
            ensemble_members: vec![
                "r1i1p1f1".to_string(),
                "r2i1p1f1".to_string(),
                "r3i1p1f1".to_string(),
            ],
            snap_coordinates: true,
        }
    }
}

impl FinderConfig {
    fn options(&self) -> StandardizeOptions {
        StandardizeOptions {
            snap_coordinates: self.snap_coordinates,
        }
    }

    fn wants_projection(&self) -> bool {
        self.projection_end >= self.projection_start
    }
}

/// Loads model output and observations through the resolution chain.
pub struct DataFinder {
    config: FinderConfig,
    resolvers: Vec<Box<dyn Resolver>>,
    store: Arc<dyn ObjectStore>,
    registry: ObservationRegistry,
}

impl DataFinder {
    /// A finder over the given sources.
    pub fn new(
        config: FinderConfig,
        resolvers: Vec<Box<dyn Resolver>>,
        store: Arc<dyn ObjectStore>,
        registry: ObservationRegistry,
    ) -> Self {
        Self {
            config,
            resolvers,
            store,
            registry,
        }
    }

    /// The configured periods and members.
    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// The observation registry in use.
    pub fn registry(&self) -> &ObservationRegistry {
        &self.registry
    }

    fn query(&self, spec: &ModelSpec, member: &str, experiment: &str, variable: &str) -> DataQuery {
        let activity = if experiment == "historical" {
            "CMIP"
        } else {
            "ScenarioMIP"
        };
        let table = variable_table(variable);
        DataQuery {
            activity: activity.to_string(),
            institution: spec.institution.clone(),
            model: spec.model.clone(),
            experiment: experiment.to_string(),
            member: member.to_string(),
            table: table.to_string(),
            variable: variable.to_string(),
            grid: grid_label(table).to_string(),
        }
    }

    fn stage_object(&self, key: &str) -> Result<tempfile::NamedTempFile, LocateError> {
        let bytes = self.store.get(key)?;
        let staging_err = |reason: String| LocateError::Search { reason };
        let file = tempfile::Builder::new()
            .suffix(".nc")
            .tempfile()
            .map_err(|e| staging_err(format!("failed to create staging file: {e}")))?;
        std::fs::write(file.path(), &bytes)
            .map_err(|e| staging_err(format!("failed to stage '{key}': {e}")))?;
        Ok(file)
    }

    fn read_standardized(&self, path: &Path, variable: &str) -> Result<GriddedDataset, LocateError> {
        let dataset = read_dataset(path, variable)?;
        Ok(standardize(dataset, &self.config.options()))
    }

    fn load_location(
        &self,
        location: &Location,
        variable: &str,
    ) -> Result<GriddedDataset, LocateError> {
        match location {
            Location::LocalFiles(paths) => {
                let mut parts = paths.iter();
                let first = parts.next().ok_or_else(|| LocateError::DatasetNotFound {
                    details: format!("empty file list for '{variable}'"),
                })?;
                let mut dataset = self.read_standardized(first, variable)?;
                for path in parts {
                    let next = self.read_standardized(path, variable)?;
                    dataset = dataset.concat_time(next).map_err(|e| {
                        LocateError::TimeAlignment {
                            reason: format!("time-split files do not join: {e}"),
                        }
                    })?;
                }
                Ok(dataset)
            }
            Location::StoreObject(key) => {
                let staged = self.stage_object(key)?;
                self.read_standardized(staged.path(), variable)
            }
        }
    }

    fn load_location_layered(
        &self,
        location: &Location,
        variable: &str,
    ) -> Result<LayeredDataset, LocateError> {
        let read = |path: &Path| -> Result<LayeredDataset, LocateError> {
            let dataset = read_layered_dataset(path, variable)?;
            Ok(standardize_layered(dataset, &self.config.options()))
        };
        match location {
            Location::LocalFiles(paths) => {
                let mut parts = paths.iter();
                let first = parts.next().ok_or_else(|| LocateError::DatasetNotFound {
                    details: format!("empty file list for '{variable}'"),
                })?;
                let mut dataset = read(first)?;
                for path in parts {
                    dataset = dataset.concat_time(read(path)?).map_err(|e| {
                        LocateError::TimeAlignment {
                            reason: format!("time-split files do not join: {e}"),
                        }
                    })?;
                }
                Ok(dataset)
            }
            Location::StoreObject(key) => {
                let staged = self.stage_object(key)?;
                read(staged.path())
            }
        }
    }

    fn check_seam(
        historical: &[MonthKey],
        projection: &[MonthKey],
    ) -> Result<(), LocateError> {
        let last = historical.last().ok_or_else(|| LocateError::TimeAlignment {
            reason: "historical segment is empty after period selection".to_string(),
        })?;
        let first = projection.first().ok_or_else(|| LocateError::TimeAlignment {
            reason: "projection segment is empty after period selection".to_string(),
        })?;
        match first.months_since(last) {
            d if d <= 0 => Err(LocateError::TimeAlignment {
                reason: format!("projection starts at {first}, before historical ends at {last}"),
            }),
            // A single missing month at the seam is tolerated.
            1 | 2 => Ok(()),
            d => Err(LocateError::TimeAlignment {
                reason: format!("{} month gap between {last} and {first}", d - 1),
            }),
        }
    }

    /// One member's full series: historical plus projection, joined.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::EnsembleNotFound`] when either segment is
    /// missing for this member, [`LocateError::TimeAlignment`] when the
    /// segments do not join cleanly.
    pub fn load_member(
        &self,
        spec: &ModelSpec,
        member: &str,
        variable: &str,
    ) -> Result<GriddedDataset, LocateError> {
        let not_found = |e: LocateError| match e {
            LocateError::DatasetNotFound { .. } => LocateError::EnsembleNotFound {
                model: spec.model.clone(),
                member: member.to_string(),
            },
            other => other,
        };

        let hist_query = self.query(spec, member, "historical", variable);
        let location = resolve_chain(&self.resolvers, &hist_query).map_err(not_found)?;
        let historical = self
            .load_location(&location, variable)?
            .select_period(self.config.historical_start, self.config.historical_end);

        if !self.config.wants_projection() {
            if historical.n_times() == 0 {
                return Err(LocateError::TimeAlignment {
                    reason: "historical segment is empty after period selection".to_string(),
                });
            }
            return Ok(historical);
        }

        let proj_query = self.query(spec, member, &self.config.projection_experiment, variable);
        let location = resolve_chain(&self.resolvers, &proj_query).map_err(not_found)?;
        let projection = self
            .load_location(&location, variable)?
            .select_period(self.config.projection_start, self.config.projection_end);

        Self::check_seam(historical.times(), projection.times())?;
        historical
            .concat_time(projection)
            .map_err(|e| LocateError::TimeAlignment {
                reason: format!("segments do not join: {e}"),
            })
    }

    /// All configured members for a model, individually.
    ///
    /// # Errors
    ///
    /// Fails on the first member that cannot be loaded; callers that want
    /// partial ensembles catch [`LocateError::EnsembleNotFound`] per call
    /// to [`DataFinder::load_member`] instead.
    pub fn load_members(
        &self,
        spec: &ModelSpec,
        variable: &str,
    ) -> Result<Vec<GriddedDataset>, LocateError> {
        info!(model = %spec.model, variable, "loading ensemble");
        self.config
            .ensemble_members
            .iter()
            .map(|member| self.load_member(spec, member, variable))
            .collect()
    }

    /// Ensemble mean of all configured members.
    pub fn load_model(
        &self,
        spec: &ModelSpec,
        variable: &str,
    ) -> Result<GriddedDataset, LocateError> {
        let members = self.load_members(spec, variable)?;
        Ok(GriddedDataset::mean_of(&members)?)
    }

    /// One member's depth-resolved series.
    pub fn load_member_layered(
        &self,
        spec: &ModelSpec,
        member: &str,
        variable: &str,
    ) -> Result<LayeredDataset, LocateError> {
        let not_found = |e: LocateError| match e {
            LocateError::DatasetNotFound { .. } => LocateError::EnsembleNotFound {
                model: spec.model.clone(),
                member: member.to_string(),
            },
            other => other,
        };

        let hist_query = self.query(spec, member, "historical", variable);
        let location = resolve_chain(&self.resolvers, &hist_query).map_err(not_found)?;
        let historical = self
            .load_location_layered(&location, variable)?
            .select_period(self.config.historical_start, self.config.historical_end);

        if !self.config.wants_projection() {
            if historical.times().is_empty() {
                return Err(LocateError::TimeAlignment {
                    reason: "historical segment is empty after period selection".to_string(),
                });
            }
            return Ok(historical);
        }

        let proj_query = self.query(spec, member, &self.config.projection_experiment, variable);
        let location = resolve_chain(&self.resolvers, &proj_query).map_err(not_found)?;
        let projection = self
            .load_location_layered(&location, variable)?
            .select_period(self.config.projection_start, self.config.projection_end);

        Self::check_seam(historical.times(), projection.times())?;
        historical
            .concat_time(projection)
            .map_err(|e| LocateError::TimeAlignment {
                reason: format!("segments do not join: {e}"),
            })
    }

    /// All configured members' depth-resolved series.
    pub fn load_members_layered(
        &self,
        spec: &ModelSpec,
        variable: &str,
    ) -> Result<Vec<LayeredDataset>, LocateError> {
        self.config
            .ensemble_members
            .iter()
            .map(|member| self.load_member_layered(spec, member, variable))
            .collect()
    }

    /// Ensemble mean of the depth-resolved series.
    pub fn load_model_layered(
        &self,
        spec: &ModelSpec,
        variable: &str,
    ) -> Result<LayeredDataset, LocateError> {
        let members = self.load_members_layered(spec, variable)?;
        Ok(LayeredDataset::mean_of(&members)?)
    }

    /// Ocean heat content per member, derived from temperature and
    /// salinity columns.
    pub fn load_ohc_members(
        &self,
        spec: &ModelSpec,
        layer: OceanLayer,
    ) -> Result<Vec<GriddedDataset>, LocateError> {
        info!(model = %spec.model, layer = layer.label(), "deriving ocean heat content");
        self.config
            .ensemble_members
            .iter()
            .map(|member| {
                let thetao = self.load_member_layered(spec, member, "thetao")?;
                let so = self.load_member_layered(spec, member, "so")?;
                ocean_heat_content(&thetao, &so, layer)
            })
            .collect()
    }

    /// Ensemble-mean ocean heat content.
    pub fn load_ohc(
        &self,
        spec: &ModelSpec,
        layer: OceanLayer,
    ) -> Result<GriddedDataset, LocateError> {
        let members = self.load_ohc_members(spec, layer)?;
        Ok(GriddedDataset::mean_of(&members)?)
    }

    /// The reference observations for a variable, restricted to the full
    /// configured period and renamed to the canonical variable name.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::UnknownObservation`] for unregistered
    /// variables and [`LocateError::Io`] when the file cannot be read.
    pub fn load_obs(
        &self,
        variable: &str,
        source: Option<&str>,
    ) -> Result<GriddedDataset, LocateError> {
        let (name, obs) = self.registry.lookup(variable, source)?;
        debug!(variable, source = name, "loading observations");

        let dataset = match (&obs.local_path, &obs.store_key) {
            (Some(path), _) if path.is_file() => read_dataset(path, &obs.source_variable)?,
            (_, Some(key)) if self.store.exists(key)? => {
                let staged = self.stage_object(key)?;
                read_dataset(staged.path(), &obs.source_variable)?
            }
            (Some(path), _) => {
                return Err(LocateError::DatasetNotFound {
                    details: format!("observation file {} for '{variable}'", path.display()),
                })
            }
            _ => {
                return Err(LocateError::DatasetNotFound {
                    details: format!("observation source '{name}' for '{variable}'"),
                })
            }
        };

        let end = if self.config.wants_projection() {
            self.config.projection_end
        } else {
            self.config.historical_end
        };
        let dataset = standardize(dataset, &self.config.options())
            .renamed(variable, obs.units.clone())
            .select_period(self.config.historical_start, end);
        Ok(dataset)
    }

    /// Model cell areas, when published. `None` means the caller should
    /// fall back to cosine-latitude weights.
    pub fn load_cell_area(
        &self,
        spec: &ModelSpec,
        variable: &str,
    ) -> Result<Option<CellAreaWeights>, LocateError> {
        let table = variable_table(variable);
        let (area_variable, area_table) = cell_area_field(table);
        let member = self
            .config
            .ensemble_members
            .first()
            .map(String::as_str)
            .unwrap_or("r1i1p1f1");
        let mut query = self.query(spec, member, "historical", variable);
        query.table = area_table.to_string();
        query.variable = area_variable.to_string();

        let location = match resolve_chain(&self.resolvers, &query) {
            Ok(location) => Some(location),
            Err(LocateError::DatasetNotFound { .. }) => {
                // Fixed fields often sit under other members or experiments.
                let mut relaxed = None;
                for resolver in &self.resolvers {
                    if let Some(hit) = resolver.resolve_relaxed(&query)? {
                        relaxed = Some(hit);
                        break;
                    }
                }
                relaxed
            }
            Err(e) => return Err(e),
        };

        match location {
            Some(Location::LocalFiles(paths)) => match paths.first() {
                Some(path) => Ok(Some(read_cell_area(path, area_variable)?)),
                None => Ok(None),
            },
            Some(Location::StoreObject(key)) => {
                let staged = self.stage_object(&key)?;
                Ok(Some(read_cell_area(staged.path(), area_variable)?))
            }
            None => {
                warn!(
                    model = %spec.model,
                    variable = area_variable,
                    "no cell-area field found, falling back to cosine-latitude weights"
                );
                Ok(None)
            }
        }
    }

    /// Ensemble member ids available for a model and variable across all
    /// sources, restricted to the `i1p1f1` family.
    pub fn find_members(
        &self,
        spec: &ModelSpec,
        variable: &str,
    ) -> Result<Vec<String>, LocateError> {
        let query = self.query(spec, "", "historical", variable);
        let mut members = Vec::new();
        for resolver in &self.resolvers {
            members.extend(resolver.members(&query)?);
        }
        members.retain(|m| m.contains("i1p1f1"));
        members.sort();
        members.dedup();
        Ok(members)
    }
}
