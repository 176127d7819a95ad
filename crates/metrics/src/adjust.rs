//! Pre-metric field adjustments.

use cbench_grid::MonthKey;
use ndarray::{Array2, Array3, Axis};

/// Area-weighted mean over every time step, skipping NaN cells; NaN when
/// nothing contributes.
pub(crate) fn weighted_field_mean(values: &Array3<f64>, weights: &Array2<f64>) -> f64 {
    let mut num = 0.0;
    let mut den = 0.0;
    for t in 0..values.dim().0 {
        for (idx, &v) in values.index_axis(Axis(0), t).indexed_iter() {
            let w = weights[idx];
            if v.is_finite() && w > 0.0 {
                num += w * v;
                den += w;
            }
        }
    }
    if den > 0.0 {
        num / den
    } else {
        f64::NAN
    }
}

/// Constant model-minus-observation offset over the aligned overlap, under
/// the same area weights the reductions use.
pub(crate) fn bias_offset(model: &Array3<f64>, obs: &Array3<f64>, weights: &Array2<f64>) -> f64 {
    weighted_field_mean(model, weights) - weighted_field_mean(obs, weights)
}

/// Subtract a constant from every value, leaving NaNs in place.
pub(crate) fn subtract_scalar(values: &mut Array3<f64>, offset: f64) {
    for v in values.iter_mut() {
        *v -= offset;
    }
}

/// Per-cell climatological mean for each calendar month, skipping NaN.
///
/// Months with no samples (or no valid samples in a cell) are NaN.
pub(crate) fn monthly_climatology(
    values: &Array3<f64>,
    times: &[MonthKey],
) -> Vec<Array2<f64>> {
    let (_, ny, nx) = values.dim();
    let mut sums = vec![Array2::<f64>::zeros((ny, nx)); 12];
    let mut counts = vec![Array2::<f64>::zeros((ny, nx)); 12];
    for (t, key) in times.iter().enumerate() {
        let m = (key.month() - 1) as usize;
        let slice = values.index_axis(Axis(0), t);
        for ((j, i), &v) in slice.indexed_iter() {
            if v.is_finite() {
                sums[m][(j, i)] += v;
                counts[m][(j, i)] += 1.0;
            }
        }
    }
    sums.into_iter()
        .zip(counts)
        .map(|(sum, count)| {
            Array2::from_shape_fn(sum.dim(), |idx| {
                if count[idx] > 0.0 {
                    sum[idx] / count[idx]
                } else {
                    f64::NAN
                }
            })
        })
        .collect()
}

/// Subtract the dataset's own monthly climatology from every time step.
pub(crate) fn subtract_climatology(values: &mut Array3<f64>, times: &[MonthKey]) {
    let clim = monthly_climatology(values, times);
    for (t, key) in times.iter().enumerate() {
        let m = (key.month() - 1) as usize;
        let mut slice = values.index_axis_mut(Axis(0), t);
        for (idx, v) in slice.indexed_iter_mut() {
            *v -= clim[m][idx];
        }
    }
}
