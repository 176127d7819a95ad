//! Run command: benchmark one model and variable, write results.

use std::sync::Arc;

use anyhow::{Context, Result};
use ndarray::Axis;
use tracing::{info, info_span};

use cbench_grid::GriddedDataset;
use cbench_locate::{
    classify, CatalogueFetcher, CatalogueSource, DataFinder, EsgfClient, FederatedSearch,
    LocalCache, ModelSpec, ObservationRegistry, OceanLayer, Resolver, VariableKind,
};
use cbench_metrics::{Adjustment, MetricCalculation, MetricKind, MetricResult, MetricValue, Period, Reduction};
use cbench_store::{LocalStore, ObjectStore, ResultsWriter};

use crate::cli::RunArgs;
use crate::config::CbenchConfig;

/// One benchmark to execute against an already-built finder.
pub struct Benchmark<'a> {
    pub institution: &'a str,
    pub model: &'a str,
    pub variable: &'a str,
    pub metric: MetricKind,
    pub reduction: Reduction,
    pub adjustments: &'a [Adjustment],
    pub lat_min: f64,
    pub lat_max: f64,
    pub period: Period,
    pub obs_source: Option<&'a str>,
    pub ocean_depth: OceanLayer,
    pub overwrite: bool,
}

/// Load the TOML configuration.
pub fn load_config(path: &std::path::Path) -> Result<CbenchConfig> {
    let toml_str = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    toml::from_str(&toml_str).context("failed to parse TOML config")
}

/// Build the finder from config: local cache always, catalogue and
/// federated search only when `remote` is set.
pub fn build_finder(config: &CbenchConfig, remote: bool) -> Result<DataFinder> {
    let mut resolvers: Vec<Box<dyn Resolver>> =
        vec![Box::new(LocalCache::new(&config.data.cache_root))];
    if remote {
        let fetcher = CatalogueFetcher::new(
            config.data.catalogue_url.clone(),
            config.data.catalogue_cache_path(),
        );
        let catalogue = fetcher.fetch().context("failed to load the catalogue")?;
        resolvers.push(Box::new(CatalogueSource::new(catalogue)));
        resolvers.push(Box::new(FederatedSearch::new(
            EsgfClient::new(config.data.search_url.clone()),
            LocalCache::new(&config.data.cache_root),
        )));
    }

    let mut registry = ObservationRegistry::builtin();
    registry.apply_overrides(&config.observations);

    Ok(DataFinder::new(
        config.finder_config(),
        resolvers,
        Arc::new(LocalStore::new(&config.store.root)),
        registry,
    ))
}

/// The store results are written to.
pub fn build_store(config: &CbenchConfig) -> Arc<dyn ObjectStore> {
    Arc::new(LocalStore::new(&config.store.root))
}

/// Execute one benchmark end to end: load, compute, persist.
pub fn execute(
    finder: &DataFinder,
    store: Arc<dyn ObjectStore>,
    experiment: &str,
    bench: &Benchmark<'_>,
) -> Result<()> {
    let spec = ModelSpec {
        institution: bench.institution.to_string(),
        model: bench.model.to_string(),
    };

    let (model, members) = match classify(bench.variable) {
        VariableKind::Derived { .. } => {
            let members = finder
                .load_ohc_members(&spec, bench.ocean_depth)
                .with_context(|| format!("failed to derive '{}'", bench.variable))?;
            let model = GriddedDataset::mean_of(&members)?;
            (model, members)
        }
        VariableKind::Direct => {
            let members = finder
                .load_members(&spec, bench.variable)
                .with_context(|| format!("failed to load '{}'", bench.variable))?;
            let model = GriddedDataset::mean_of(&members)?;
            (model, members)
        }
    };

    let obs = finder
        .load_obs(bench.variable, bench.obs_source)
        .with_context(|| format!("failed to load observations for '{}'", bench.variable))?;
    let weights = finder.load_cell_area(&spec, bench.variable)?;

    let calc = MetricCalculation::new(model, obs, members, weights)
        .context("model and observations are not comparable")?;

    let writer = ResultsWriter::new(store, experiment, bench.variable);
    if bench.overwrite {
        let removed = writer.overwrite()?;
        info!(removed, "cleared previous results");
    }

    for &adjustment in bench.adjustments {
        let value = calc
            .calculate(
                bench.metric,
                bench.reduction,
                adjustment,
                Some(bench.period),
                bench.lat_min,
                bench.lat_max,
            )
            .with_context(|| format!("{} ({adjustment}) failed", bench.metric))?;
        let result = MetricResult {
            model: bench.model.to_string(),
            variable: bench.variable.to_string(),
            metric: bench.metric,
            reduction: bench.reduction,
            adjustment,
            lat_min: bench.lat_min,
            lat_max: bench.lat_max,
            period: bench.period,
            value,
        };
        persist(&writer, &result)?;
        info!(
            model = bench.model,
            variable = bench.variable,
            metric = %bench.metric,
            adjustment = %adjustment,
            "result written"
        );
    }
    Ok(())
}

/// Route a result to the object matching its shape.
fn persist(writer: &ResultsWriter, result: &MetricResult) -> Result<()> {
    match &result.value {
        MetricValue::Scalar(_) => {
            writer.save_table(result)?;
        }
        MetricValue::Series(series) => {
            let name = format!(
                "{}_{}_{}_{}",
                result.model,
                result.metric.as_str(),
                result.adjustment.as_str(),
                result.region_label()
            );
            writer.save_series(series, &name)?;
        }
        MetricValue::Map { coords, values } => {
            let name = format!(
                "{}_{}_{}_{}",
                result.model,
                result.metric.as_str(),
                result.adjustment.as_str(),
                result.region_label()
            );
            // A single-timestep grid keyed by the start of the window.
            let map = GriddedDataset::new(
                result.variable.clone(),
                None,
                vec![result.period.start()?],
                coords.clone(),
                values.clone().insert_axis(Axis(0)),
            )?;
            writer.save_grid(&map, &name)?;
        }
    }
    Ok(())
}

/// Run the single-benchmark pipeline.
pub fn run(args: RunArgs) -> Result<()> {
    let _cmd = info_span!("run").entered();
    let config = load_config(&args.config)?;
    let finder = build_finder(&config, args.remote)?;
    let store = build_store(&config);

    let period = Period {
        start_year: args
            .start_year
            .unwrap_or(config.periods.historical_start),
        end_year: args.end_year.unwrap_or_else(|| {
            if config.periods.projection_end >= config.periods.projection_start {
                config.periods.projection_end
            } else {
                config.periods.historical_end
            }
        }),
    };

    let bench = Benchmark {
        institution: &args.institution,
        model: &args.model,
        variable: &args.variable,
        metric: args.metric,
        reduction: args.reduction,
        adjustments: &args.adjustments,
        lat_min: args.lat_min,
        lat_max: args.lat_max,
        period,
        obs_source: args.obs_source.as_deref(),
        ocean_depth: args.ocean_depth,
        overwrite: args.overwrite,
    };
    execute(&finder, store, config.experiment_label(), &bench)
}
