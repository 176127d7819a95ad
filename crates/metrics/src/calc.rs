//! Metric calculation over aligned model and observation fields.

use std::collections::BTreeMap;

use cbench_grid::{CellAreaWeights, Coords, GriddedDataset, MonthKey};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use tracing::warn;

use crate::adjust::{bias_offset, subtract_climatology, subtract_scalar};
use crate::error::MetricError;
use crate::result::{Adjustment, MetricKind, MetricValue, Period, Reduction};

/// Area-weighted spatial mean of a dataset per time step.
///
/// The standalone entry point behind the calculator's zonal-mean reduction:
/// cells outside `[lat_min, lat_max]` are excluded, NaN cells are skipped
/// and the weights renormalized over what remains. When `weights` is absent
/// a cosine-latitude proxy is used.
///
/// # Errors
///
/// Returns [`MetricError::InvalidBounds`] for an invalid or empty latitude
/// band and [`MetricError::ShapeMismatch`] when the weights do not match the
/// dataset grid.
pub fn zonal_mean(
    ds: &GriddedDataset,
    weights: Option<&CellAreaWeights>,
    lat_min: f64,
    lat_max: f64,
) -> Result<Vec<f64>, MetricError> {
    let band = band_weights(ds.coords(), weights, lat_min, lat_max)?;
    Ok((0..ds.n_times())
        .map(|t| weighted_mean(ds.values().index_axis(Axis(0), t), band.areas()))
        .collect())
}

/// A metric calculation bound to one model/observation pair.
///
/// Construction validates grid compatibility once; every call to
/// [`calculate`](Self::calculate) is then pure and deterministic.
#[derive(Debug)]
pub struct MetricCalculation {
    obs: GriddedDataset,
    model: GriddedDataset,
    members: Vec<GriddedDataset>,
    weights: Option<CellAreaWeights>,
}

impl MetricCalculation {
    /// Bind a calculation to its inputs.
    ///
    /// `model` is the ensemble mean; `members` carries the per-member series
    /// when an ensemble metric will be requested, and may be empty otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::ShapeMismatch`] when any input is on a
    /// different grid than the observations.
    pub fn new(
        model: GriddedDataset,
        obs: GriddedDataset,
        members: Vec<GriddedDataset>,
        weights: Option<CellAreaWeights>,
    ) -> Result<Self, MetricError> {
        let obs_shape = obs.coords().shape();
        if model.coords().shape() != obs_shape {
            return Err(MetricError::ShapeMismatch {
                model: model.coords().shape(),
                obs: obs_shape,
            });
        }
        for member in &members {
            if member.coords().shape() != obs_shape {
                return Err(MetricError::ShapeMismatch {
                    model: member.coords().shape(),
                    obs: obs_shape,
                });
            }
        }
        if let Some(w) = &weights {
            if w.shape() != obs_shape {
                return Err(MetricError::ShapeMismatch {
                    model: w.shape(),
                    obs: obs_shape,
                });
            }
        }
        Ok(Self {
            obs,
            model,
            members,
            weights,
        })
    }

    /// Compute one metric under one reduction and adjustment.
    ///
    /// # Errors
    ///
    /// See [`MetricError`]; notably [`MetricError::EmptyOverlap`] when model
    /// and observations share no month in the window and
    /// [`MetricError::EnsembleRequired`] for CRPS with fewer than two
    /// members.
    pub fn calculate(
        &self,
        metric: MetricKind,
        reduction: Reduction,
        adjustment: Adjustment,
        period: Option<Period>,
        lat_min: f64,
        lat_max: f64,
    ) -> Result<MetricValue, MetricError> {
        validate_bounds(lat_min, lat_max)?;
        if metric == MetricKind::Crps {
            if reduction == Reduction::Temporal {
                return Err(MetricError::Unsupported {
                    details: "temporal reduction is not defined for crps".to_string(),
                });
            }
            if self.members.len() < 2 {
                return Err(MetricError::EnsembleRequired {
                    got: self.members.len(),
                });
            }
        }
        if reduction == Reduction::Temporal && metric != MetricKind::Rmse {
            return Err(MetricError::Unsupported {
                details: format!("temporal reduction is only defined for rmse, not {metric}"),
            });
        }

        let aligned = self.align(period)?;
        let Aligned {
            times,
            mut obs,
            mut model,
            mut members,
        } = aligned;

        let band = band_weights(self.model.coords(), self.weights.as_ref(), lat_min, lat_max)?;

        match adjustment {
            Adjustment::None => {}
            Adjustment::BiasAdjusted => {
                // One offset from the ensemble mean, applied uniformly so
                // member spread is preserved. Weighted like the reductions,
                // over the same band.
                let offset = bias_offset(&model, &obs, band.areas());
                subtract_scalar(&mut model, offset);
                for m in &mut members {
                    subtract_scalar(m, offset);
                }
            }
            Adjustment::Anomaly => {
                subtract_climatology(&mut obs, &times);
                subtract_climatology(&mut model, &times);
                for m in &mut members {
                    subtract_climatology(m, &times);
                }
            }
        }

        match reduction {
            Reduction::ZonalMean => {
                self.reduce_zonal(metric, &times, &obs, &model, &members, &band)
            }
            Reduction::Spatial => {
                self.reduce_spatial(metric, &times, &obs, &model, &members, &band)
            }
            Reduction::Temporal => Ok(MetricValue::Map {
                coords: self.model.coords().clone(),
                values: temporal_rmse(&obs, &model),
            }),
        }
    }

    fn reduce_zonal(
        &self,
        metric: MetricKind,
        times: &[MonthKey],
        obs: &Array3<f64>,
        model: &Array3<f64>,
        members: &[Array3<f64>],
        band: &CellAreaWeights,
    ) -> Result<MetricValue, MetricError> {
        let obs_series = spatial_mean_series(obs, band);
        match metric {
            MetricKind::Rmse => {
                let model_series = spatial_mean_series(model, band);
                Ok(MetricValue::Scalar(series_rmse(&model_series, &obs_series)))
            }
            MetricKind::Mae => {
                let model_series = spatial_mean_series(model, band);
                Ok(MetricValue::Scalar(series_mae(&model_series, &obs_series)))
            }
            MetricKind::Crps => {
                let member_series: Vec<Vec<f64>> = members
                    .iter()
                    .map(|m| spatial_mean_series(m, band))
                    .collect();
                let per_time: Vec<f64> = (0..times.len())
                    .map(|t| {
                        let ensemble: Vec<f64> =
                            member_series.iter().map(|s| s[t]).collect();
                        crps_ensemble(&ensemble, obs_series[t])
                    })
                    .collect();
                Ok(MetricValue::Scalar(finite_mean_slice(&per_time)))
            }
        }
    }

    fn reduce_spatial(
        &self,
        metric: MetricKind,
        times: &[MonthKey],
        obs: &Array3<f64>,
        model: &Array3<f64>,
        members: &[Array3<f64>],
        band: &CellAreaWeights,
    ) -> Result<MetricValue, MetricError> {
        let series: Vec<(MonthKey, f64)> = (0..times.len())
            .map(|t| {
                let o = obs.index_axis(Axis(0), t);
                let value = match metric {
                    MetricKind::Rmse => {
                        let m = model.index_axis(Axis(0), t);
                        let sq = Array2::from_shape_fn(o.dim(), |idx| {
                            let d = m[idx] - o[idx];
                            d * d
                        });
                        weighted_mean(sq.view(), band.areas()).sqrt()
                    }
                    MetricKind::Mae => {
                        let m = model.index_axis(Axis(0), t);
                        let abs = Array2::from_shape_fn(o.dim(), |idx| (m[idx] - o[idx]).abs());
                        weighted_mean(abs.view(), band.areas())
                    }
                    MetricKind::Crps => {
                        let cell_crps = Array2::from_shape_fn(o.dim(), |idx| {
                            let ensemble: Vec<f64> =
                                members.iter().map(|mem| mem[(t, idx.0, idx.1)]).collect();
                            crps_ensemble(&ensemble, o[idx])
                        });
                        weighted_mean(cell_crps.view(), band.areas())
                    }
                };
                (times[t], value)
            })
            .collect();
        Ok(MetricValue::Series(series))
    }

    /// Select the months shared by every input, restricted to `period`.
    fn align(&self, period: Option<Period>) -> Result<Aligned, MetricError> {
        let (range_start, range_end) = match period {
            Some(p) => (
                p.start().map_err(|_| MetricError::EmptyOverlap)?,
                p.end().map_err(|_| MetricError::EmptyOverlap)?,
            ),
            None => {
                let min = MonthKey::new(i32::MIN / 2, 1).map_err(|_| MetricError::EmptyOverlap)?;
                let max =
                    MonthKey::new(i32::MAX / 2, 12).map_err(|_| MetricError::EmptyOverlap)?;
                (min, max)
            }
        };

        let mut common: BTreeMap<MonthKey, ()> = self
            .obs
            .times()
            .iter()
            .filter(|t| **t >= range_start && **t <= range_end)
            .map(|t| (*t, ()))
            .collect();
        common.retain(|t, _| self.model.times().contains(t));
        for member in &self.members {
            common.retain(|t, _| member.times().contains(t));
        }
        if common.is_empty() {
            return Err(MetricError::EmptyOverlap);
        }
        let times: Vec<MonthKey> = common.keys().copied().collect();

        Ok(Aligned {
            obs: select_months(&self.obs, &times),
            model: select_months(&self.model, &times),
            members: self
                .members
                .iter()
                .map(|m| select_months(m, &times))
                .collect(),
            times,
        })
    }
}

struct Aligned {
    times: Vec<MonthKey>,
    obs: Array3<f64>,
    model: Array3<f64>,
    members: Vec<Array3<f64>>,
}

fn select_months(ds: &GriddedDataset, months: &[MonthKey]) -> Array3<f64> {
    let index: BTreeMap<MonthKey, usize> = ds
        .times()
        .iter()
        .enumerate()
        .map(|(i, t)| (*t, i))
        .collect();
    let idx: Vec<usize> = months.iter().filter_map(|t| index.get(t).copied()).collect();
    ds.values().select(Axis(0), &idx)
}

fn validate_bounds(lat_min: f64, lat_max: f64) -> Result<(), MetricError> {
    if lat_min > lat_max || lat_min < -90.0 || lat_max > 90.0 {
        return Err(MetricError::InvalidBounds { lat_min, lat_max });
    }
    Ok(())
}

/// Resolve the effective weights for a latitude band, falling back to the
/// cosine-latitude proxy when no cell area data is available.
fn band_weights(
    coords: &Coords,
    weights: Option<&CellAreaWeights>,
    lat_min: f64,
    lat_max: f64,
) -> Result<CellAreaWeights, MetricError> {
    let base = match weights {
        Some(w) => w.clone(),
        None => {
            warn!("no cell area weights provided, using cosine-latitude proxy");
            CellAreaWeights::cosine_lat(coords).map_err(|_| MetricError::InvalidBounds {
                lat_min,
                lat_max,
            })?
        }
    };
    base.masked_to_band(coords, lat_min, lat_max)
        .map_err(|e| match e {
            cbench_grid::GridError::DimensionMismatch { .. } => MetricError::ShapeMismatch {
                model: coords.shape(),
                obs: base.shape(),
            },
            _ => MetricError::InvalidBounds { lat_min, lat_max },
        })
}

/// Area-weighted mean over a 2-D field, skipping NaN cells.
fn weighted_mean(values: ArrayView2<'_, f64>, weights: &Array2<f64>) -> f64 {
    let mut num = 0.0;
    let mut den = 0.0;
    for (idx, &v) in values.indexed_iter() {
        let w = weights[idx];
        if v.is_finite() && w > 0.0 {
            num += w * v;
            den += w;
        }
    }
    if den > 0.0 {
        num / den
    } else {
        f64::NAN
    }
}

fn spatial_mean_series(values: &Array3<f64>, band: &CellAreaWeights) -> Vec<f64> {
    (0..values.dim().0)
        .map(|t| weighted_mean(values.index_axis(Axis(0), t), band.areas()))
        .collect()
}

fn series_rmse(model: &[f64], obs: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for (&m, &o) in model.iter().zip(obs) {
        if m.is_finite() && o.is_finite() {
            let d = m - o;
            sum += d * d;
            n += 1;
        }
    }
    if n == 0 {
        f64::NAN
    } else {
        (sum / n as f64).sqrt()
    }
}

fn series_mae(model: &[f64], obs: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for (&m, &o) in model.iter().zip(obs) {
        if m.is_finite() && o.is_finite() {
            sum += (m - o).abs();
            n += 1;
        }
    }
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

fn finite_mean_slice(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for &v in values {
        if v.is_finite() {
            sum += v;
            n += 1;
        }
    }
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Ensemble CRPS for one observation, the standard estimator
/// `mean_i |x_i - y| - sum_{i,j} |x_i - x_j| / (2 m^2)`.
///
/// NaN members are dropped; NaN when fewer than two valid members remain or
/// the observation is NaN.
fn crps_ensemble(members: &[f64], obs: f64) -> f64 {
    if !obs.is_finite() {
        return f64::NAN;
    }
    let valid: Vec<f64> = members.iter().copied().filter(|v| v.is_finite()).collect();
    let m = valid.len();
    if m < 2 {
        return f64::NAN;
    }
    let term1 = valid.iter().map(|x| (x - obs).abs()).sum::<f64>() / m as f64;
    let mut pair_sum = 0.0;
    for (i, &xi) in valid.iter().enumerate() {
        for &xj in &valid[i + 1..] {
            pair_sum += (xi - xj).abs();
        }
    }
    // pair_sum covers unordered pairs once; the ordered-pair sum is twice
    // that, so the 2 m^2 denominator reduces to m^2.
    let term2 = pair_sum / (m * m) as f64;
    term1 - term2
}

/// Per-cell RMSE over time, skipping NaN pairs.
fn temporal_rmse(obs: &Array3<f64>, model: &Array3<f64>) -> Array2<f64> {
    let (nt, ny, nx) = obs.dim();
    Array2::from_shape_fn((ny, nx), |(j, i)| {
        let mut sum = 0.0;
        let mut n = 0usize;
        for t in 0..nt {
            let o = obs[(t, j, i)];
            let m = model[(t, j, i)];
            if o.is_finite() && m.is_finite() {
                let d = m - o;
                sum += d * d;
                n += 1;
            }
        }
        if n == 0 {
            f64::NAN
        } else {
            (sum / n as f64).sqrt()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crps_ensemble_closed_form() {
        // Two members at 0 and 4, observation at 5:
        // term1 = (5 + 1) / 2 = 3, term2 = (4 + 4) / (2 * 2 * 2) = 1.
        let crps = crps_ensemble(&[0.0, 4.0], 5.0);
        assert!((crps - 2.0).abs() < 1e-12);
    }

    #[test]
    fn crps_ensemble_spread_term_uses_squared_member_count() {
        // Three members at 0, 3, 6 against their own median: term1 = 2 and
        // the ordered-pair spread sum is 24, so term2 = 24 / (2 * 9) = 4/3.
        let crps = crps_ensemble(&[0.0, 3.0, 6.0], 3.0);
        assert!((crps - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn crps_ensemble_zero_for_perfect_ensemble() {
        // All members equal the observation.
        assert_eq!(crps_ensemble(&[1.0, 1.0, 1.0], 1.0), 0.0);
    }

    #[test]
    fn crps_ensemble_nan_cases() {
        assert!(crps_ensemble(&[1.0], 1.0).is_nan());
        assert!(crps_ensemble(&[1.0, f64::NAN], 1.0).is_nan());
        assert!(crps_ensemble(&[1.0, 2.0], f64::NAN).is_nan());
    }

    #[test]
    fn weighted_mean_renormalizes_over_valid_cells() {
        let values = ndarray::array![[1.0, f64::NAN], [3.0, 5.0]];
        let weights = ndarray::array![[1.0, 10.0], [1.0, 0.0]];
        // NaN cell and zero-weight cell both drop out.
        assert_eq!(weighted_mean(values.view(), &weights), 2.0);
    }

    #[test]
    fn bounds_validation() {
        assert!(validate_bounds(-90.0, 90.0).is_ok());
        assert!(validate_bounds(30.0, -30.0).is_err());
        assert!(validate_bounds(-100.0, 0.0).is_err());
        assert!(validate_bounds(0.0, 91.0).is_err());
    }
}
