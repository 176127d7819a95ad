//! Bulk command: benchmark every configured combination, skipping failures.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{error, info, info_span};

use cbench_locate::OceanLayer;
use cbench_metrics::{Adjustment, MetricKind, Period, Reduction};
use cbench_store::{ObjectStore, ResultsWriter};

use crate::cli::BulkArgs;
use crate::run_cmd::{build_finder, build_store, execute, load_config, Benchmark};

/// Clear each variable's results destination exactly once.
///
/// Runs before the tuple loop so a failed first tuple for a variable cannot
/// leave stale rows from a previous run behind.
fn clear_destinations(
    store: &Arc<dyn ObjectStore>,
    experiment: &str,
    variables: &BTreeSet<&str>,
) -> Result<()> {
    for variable in variables {
        let writer = ResultsWriter::new(store.clone(), experiment, *variable);
        let removed = writer.overwrite()?;
        info!(variable = %variable, removed, "cleared previous results");
    }
    Ok(())
}

/// Run the bulk pipeline.
///
/// Each (model, variable, metric) tuple is independent: a missing ensemble
/// or unreadable file is logged and skipped. The command only fails when
/// nothing succeeds.
pub fn run(args: BulkArgs) -> Result<()> {
    let _cmd = info_span!("bulk").entered();
    let config = load_config(&args.config)?;
    if config.bulk.models.is_empty() {
        bail!("no [[bulk.models]] entries in {}", args.config.display());
    }

    let metrics: Vec<MetricKind> = config
        .bulk
        .metrics
        .iter()
        .map(|m| m.parse())
        .collect::<Result<_, _>>()?;
    let adjustments: Vec<Adjustment> = config
        .bulk
        .adjustments
        .iter()
        .map(|a| a.parse())
        .collect::<Result<_, _>>()?;

    let finder = build_finder(&config, args.remote)?;
    let store = build_store(&config);
    let period = Period {
        start_year: config.periods.historical_start,
        end_year: if config.periods.projection_end >= config.periods.projection_start {
            config.periods.projection_end
        } else {
            config.periods.historical_end
        },
    };

    if args.overwrite {
        let variables: BTreeSet<&str> = config
            .bulk
            .models
            .iter()
            .map(|m| m.variable.as_str())
            .collect();
        clear_destinations(&store, config.experiment_label(), &variables)?;
    }

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    for entry in &config.bulk.models {
        for &metric in &metrics {
            let bench = Benchmark {
                institution: &entry.org,
                model: &entry.model,
                variable: &entry.variable,
                metric,
                reduction: Reduction::ZonalMean,
                adjustments: &adjustments,
                lat_min: -90.0,
                lat_max: 90.0,
                period,
                obs_source: None,
                ocean_depth: OceanLayer::Mixed,
                overwrite: false,
            };
            match execute(&finder, store.clone(), config.experiment_label(), &bench) {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    failed += 1;
                    error!(
                        model = %entry.model,
                        variable = %entry.variable,
                        metric = %metric,
                        "skipped: {e:#}"
                    );
                }
            }
        }
    }

    info!(succeeded, failed, "bulk run finished");
    if succeeded == 0 {
        bail!("all {failed} benchmark combinations failed");
    }
    Ok(())
}
