//! # cbench-metrics
//!
//! Skill metrics (RMSE, MAE, ensemble CRPS) comparing model fields against
//! observations on a shared grid, with optional bias and anomaly adjustments
//! and area-weighted latitude-band reductions. Pure computation: no I/O.

mod adjust;
mod calc;
mod error;
mod result;

pub use calc::{zonal_mean, MetricCalculation};
pub use error::MetricError;
pub use result::{
    Adjustment, MetricKind, MetricResult, MetricValue, Period, Reduction,
};
