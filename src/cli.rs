use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cbench_locate::OceanLayer;
use cbench_metrics::{Adjustment, MetricKind, Reduction};

/// CMIP6 climate model benchmarking engine.
#[derive(Parser)]
#[command(
    name = "cbench",
    version,
    about = "Benchmark CMIP6 model output against observations"
)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Benchmark one model and variable.
    Run(RunArgs),
    /// Benchmark every configured (model, variable) combination.
    Bulk(BulkArgs),
}

/// Arguments for the `run` subcommand.
#[derive(clap::Args)]
pub struct RunArgs {
    /// Path to TOML configuration file.
    #[arg(short, long, default_value = "cbench.toml")]
    pub config: PathBuf,

    /// Institution id the model is published under (e.g. CSIRO-ARCCSS).
    #[arg(long = "org")]
    pub institution: String,

    /// Model name (e.g. ACCESS-CM2).
    #[arg(short, long)]
    pub model: String,

    /// Variable short name (e.g. tas, pr, tos, ohc).
    #[arg(long = "var")]
    pub variable: String,

    /// Metric to compute (rmse, mae, crps).
    #[arg(long, default_value = "rmse")]
    pub metric: MetricKind,

    /// Reduction over the error field (zonal_mean, spatial, temporal).
    #[arg(long, default_value = "zonal_mean")]
    pub reduction: Reduction,

    /// Adjustments to compute, one result each (none, bias_adjusted,
    /// anomaly).
    #[arg(long, value_delimiter = ',', default_value = "none")]
    pub adjustments: Vec<Adjustment>,

    /// Lower latitude bound of the evaluated band.
    #[arg(long, default_value_t = -90.0, allow_hyphen_values = true)]
    pub lat_min: f64,

    /// Upper latitude bound of the evaluated band.
    #[arg(long, default_value_t = 90.0, allow_hyphen_values = true)]
    pub lat_max: f64,

    /// First year of the evaluation window (default: configured historical
    /// start).
    #[arg(long)]
    pub start_year: Option<i32>,

    /// Last year of the evaluation window (default: configured projection
    /// end).
    #[arg(long)]
    pub end_year: Option<i32>,

    /// Observation source name (default: the variable's primary source).
    #[arg(long)]
    pub obs_source: Option<String>,

    /// Consult the archive catalogue and federated search, not just the
    /// local cache.
    #[arg(long)]
    pub remote: bool,

    /// Clear previously written results for this destination first.
    #[arg(long)]
    pub overwrite: bool,

    /// Depth layer for ocean heat content (mixed = 0-100 m, deep =
    /// 0-2000 m).
    #[arg(long, default_value = "mixed")]
    pub ocean_depth: OceanLayer,
}

/// Arguments for the `bulk` subcommand.
#[derive(clap::Args)]
pub struct BulkArgs {
    /// Path to TOML configuration file.
    #[arg(short, long, default_value = "cbench.toml")]
    pub config: PathBuf,

    /// Consult the archive catalogue and federated search, not just the
    /// local cache.
    #[arg(long)]
    pub remote: bool,

    /// Clear previously written results for each destination first.
    #[arg(long)]
    pub overwrite: bool,
}
