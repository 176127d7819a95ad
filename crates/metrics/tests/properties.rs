//! Integration tests for the metric calculator's documented properties.

use cbench_grid::{CellAreaWeights, Coords, GriddedDataset, MonthKey};
use cbench_metrics::{
    zonal_mean, Adjustment, MetricCalculation, MetricError, MetricKind, MetricValue, Period,
    Reduction,
};
use ndarray::{Array2, Array3};

fn month(y: i32, m: u32) -> MonthKey {
    MonthKey::new(y, m).unwrap()
}

fn months(year: i32, n: usize) -> Vec<MonthKey> {
    (0..n)
        .map(|i| month(year + i as i32 / 12, (i % 12 + 1) as u32))
        .collect()
}

fn coords_2x2() -> Coords {
    Coords::Rectilinear {
        lat: vec![-30.0, 30.0],
        lon: vec![90.0, 270.0],
    }
}

fn constant(name: &str, value: f64, n_times: usize) -> GriddedDataset {
    GriddedDataset::new(
        name,
        Some("K".into()),
        months(2005, n_times),
        coords_2x2(),
        Array3::from_elem((n_times, 2, 2), value),
    )
    .unwrap()
}

fn scalar(value: MetricValue) -> f64 {
    match value {
        MetricValue::Scalar(v) => v,
        other => panic!("expected scalar, got {other:?}"),
    }
}

#[test]
fn identical_fields_score_zero() {
    let calc = MetricCalculation::new(
        constant("tas", 288.0, 12),
        constant("tas", 288.0, 12),
        vec![constant("tas", 288.0, 12), constant("tas", 288.0, 12)],
        None,
    )
    .unwrap();

    for metric in [MetricKind::Rmse, MetricKind::Mae, MetricKind::Crps] {
        let v = scalar(
            calc.calculate(metric, Reduction::ZonalMean, Adjustment::None, None, -90.0, 90.0)
                .unwrap(),
        );
        assert!(v.abs() < 1e-12, "{metric} was {v}");
    }
}

#[test]
fn constant_offset_gives_exact_rmse_and_mae() {
    // Model 2.0 everywhere, observations 1.0: rmse = mae = 1.0.
    let calc = MetricCalculation::new(
        constant("tas", 2.0, 12),
        constant("tas", 1.0, 12),
        vec![],
        None,
    )
    .unwrap();

    let rmse = scalar(
        calc.calculate(
            MetricKind::Rmse,
            Reduction::ZonalMean,
            Adjustment::None,
            None,
            -90.0,
            90.0,
        )
        .unwrap(),
    );
    let mae = scalar(
        calc.calculate(
            MetricKind::Mae,
            Reduction::ZonalMean,
            Adjustment::None,
            None,
            -90.0,
            90.0,
        )
        .unwrap(),
    );
    assert!((rmse - 1.0).abs() < 1e-12);
    assert!((mae - 1.0).abs() < 1e-12);
}

#[test]
fn bias_adjustment_removes_constant_offset() {
    let calc = MetricCalculation::new(
        constant("tas", 2.0, 12),
        constant("tas", 1.0, 12),
        vec![],
        None,
    )
    .unwrap();
    let rmse = scalar(
        calc.calculate(
            MetricKind::Rmse,
            Reduction::ZonalMean,
            Adjustment::BiasAdjusted,
            None,
            -90.0,
            90.0,
        )
        .unwrap(),
    );
    assert!(rmse.abs() < 1e-12);
}

#[test]
fn bias_offset_uses_the_reduction_weights() {
    // The model error is 0 in the south row and 4 in the north row; with
    // 3:1 area weights the offset is 1.0 and the weighted spatial mean of
    // the adjusted difference vanishes at every time step, so zonal RMSE is
    // exactly zero. An unweighted offset (2.0) would leave a residual.
    let obs = constant("tas", 0.0, 6);
    let model_values = Array3::from_shape_fn((6, 2, 2), |(_, j, _)| 4.0 * j as f64);
    let model =
        GriddedDataset::new("tas", None, months(2005, 6), coords_2x2(), model_values).unwrap();
    let areas = Array2::from_shape_fn((2, 2), |(j, _)| 3.0 - 2.0 * j as f64);
    let weights = CellAreaWeights::new(areas).unwrap();

    let calc = MetricCalculation::new(model, obs, vec![], Some(weights)).unwrap();
    let rmse = scalar(
        calc.calculate(
            MetricKind::Rmse,
            Reduction::ZonalMean,
            Adjustment::BiasAdjusted,
            None,
            -90.0,
            90.0,
        )
        .unwrap(),
    );
    assert!(rmse.abs() < 1e-12);
}

#[test]
fn anomaly_adjustment_ignores_seasonal_cycle_offset() {
    // Model = observations + a seasonal cycle: anomalies agree exactly.
    let times = months(2005, 24);
    let obs_values = Array3::from_shape_fn((24, 2, 2), |(t, j, _)| (t % 3) as f64 + j as f64);
    let model_values = Array3::from_shape_fn((24, 2, 2), |(t, j, _)| {
        (t % 3) as f64 + j as f64 + f64::from(times[t].month()) * 2.0
    });
    let obs =
        GriddedDataset::new("tas", None, times.clone(), coords_2x2(), obs_values).unwrap();
    let model = GriddedDataset::new("tas", None, times, coords_2x2(), model_values).unwrap();

    let calc = MetricCalculation::new(model, obs, vec![], None).unwrap();
    let rmse = scalar(
        calc.calculate(
            MetricKind::Rmse,
            Reduction::ZonalMean,
            Adjustment::Anomaly,
            None,
            -90.0,
            90.0,
        )
        .unwrap(),
    );
    assert!(rmse.abs() < 1e-9);
}

#[test]
fn disjoint_periods_are_empty_overlap() {
    let model = GriddedDataset::new(
        "tas",
        None,
        months(2005, 12),
        coords_2x2(),
        Array3::zeros((12, 2, 2)),
    )
    .unwrap();
    let obs = GriddedDataset::new(
        "tas",
        None,
        months(1990, 12),
        coords_2x2(),
        Array3::zeros((12, 2, 2)),
    )
    .unwrap();
    let calc = MetricCalculation::new(model, obs, vec![], None).unwrap();
    let err = calc
        .calculate(
            MetricKind::Rmse,
            Reduction::ZonalMean,
            Adjustment::None,
            None,
            -90.0,
            90.0,
        )
        .unwrap_err();
    assert!(matches!(err, MetricError::EmptyOverlap));
}

#[test]
fn period_restriction_can_empty_the_overlap() {
    let calc = MetricCalculation::new(
        constant("tas", 1.0, 12),
        constant("tas", 1.0, 12),
        vec![],
        None,
    )
    .unwrap();
    let err = calc
        .calculate(
            MetricKind::Rmse,
            Reduction::ZonalMean,
            Adjustment::None,
            Some(Period {
                start_year: 2050,
                end_year: 2060,
            }),
            -90.0,
            90.0,
        )
        .unwrap_err();
    assert!(matches!(err, MetricError::EmptyOverlap));
}

#[test]
fn mismatched_grids_are_rejected_at_construction() {
    let obs = GriddedDataset::new(
        "tas",
        None,
        months(2005, 2),
        Coords::Rectilinear {
            lat: vec![-30.0, 0.0, 30.0],
            lon: vec![90.0, 270.0],
        },
        Array3::zeros((2, 3, 2)),
    )
    .unwrap();
    let err = MetricCalculation::new(constant("tas", 1.0, 2), obs, vec![], None).unwrap_err();
    assert!(matches!(err, MetricError::ShapeMismatch { .. }));
}

#[test]
fn crps_without_ensemble_is_rejected() {
    let calc = MetricCalculation::new(
        constant("tas", 1.0, 2),
        constant("tas", 1.0, 2),
        vec![constant("tas", 1.0, 2)],
        None,
    )
    .unwrap();
    let err = calc
        .calculate(
            MetricKind::Crps,
            Reduction::ZonalMean,
            Adjustment::None,
            None,
            -90.0,
            90.0,
        )
        .unwrap_err();
    assert!(matches!(err, MetricError::EnsembleRequired { got: 1 }));
}

#[test]
fn crps_matches_closed_form_for_two_members() {
    // Members 0 and 4 everywhere, observations 5: the ensemble CRPS is
    // mean|x_i - y| - sum|x_i - x_j| / (2 m^2) = 3 - 1 = 2.0 at every cell
    // and time step, so every reduction yields 2.0.
    let calc = MetricCalculation::new(
        constant("tas", 2.0, 6),
        constant("tas", 5.0, 6),
        vec![constant("tas", 0.0, 6), constant("tas", 4.0, 6)],
        None,
    )
    .unwrap();
    let zonal = scalar(
        calc.calculate(
            MetricKind::Crps,
            Reduction::ZonalMean,
            Adjustment::None,
            None,
            -90.0,
            90.0,
        )
        .unwrap(),
    );
    assert!((zonal - 2.0).abs() < 1e-12);

    match calc
        .calculate(
            MetricKind::Crps,
            Reduction::Spatial,
            Adjustment::None,
            None,
            -90.0,
            90.0,
        )
        .unwrap()
    {
        MetricValue::Series(series) => {
            assert_eq!(series.len(), 6);
            for (_, v) in series {
                assert!((v - 2.0).abs() < 1e-12);
            }
        }
        other => panic!("expected series, got {other:?}"),
    }
}

#[test]
fn temporal_reduction_maps_per_cell_rmse() {
    // Error differs per row: 0 in the south row, 2 in the north row.
    let obs = constant("tas", 1.0, 4);
    let model_values = Array3::from_shape_fn((4, 2, 2), |(_, j, _)| 1.0 + 2.0 * j as f64);
    let model =
        GriddedDataset::new("tas", None, months(2005, 4), coords_2x2(), model_values).unwrap();
    let calc = MetricCalculation::new(model, obs, vec![], None).unwrap();
    match calc
        .calculate(
            MetricKind::Rmse,
            Reduction::Temporal,
            Adjustment::None,
            None,
            -90.0,
            90.0,
        )
        .unwrap()
    {
        MetricValue::Map { values, .. } => {
            assert_eq!(values[(0, 0)], 0.0);
            assert_eq!(values[(1, 1)], 2.0);
        }
        other => panic!("expected map, got {other:?}"),
    }
}

#[test]
fn temporal_crps_is_unsupported() {
    let calc = MetricCalculation::new(
        constant("tas", 1.0, 2),
        constant("tas", 1.0, 2),
        vec![constant("tas", 1.0, 2), constant("tas", 1.0, 2)],
        None,
    )
    .unwrap();
    let err = calc
        .calculate(
            MetricKind::Crps,
            Reduction::Temporal,
            Adjustment::None,
            None,
            -90.0,
            90.0,
        )
        .unwrap_err();
    assert!(matches!(err, MetricError::Unsupported { .. }));
}

#[test]
fn latitude_band_restricts_the_mean() {
    // South row 0.0, north row 10.0; a northern band sees only 10.0.
    let values = Array3::from_shape_fn((2, 2, 2), |(_, j, _)| 10.0 * j as f64);
    let ds = GriddedDataset::new("tas", None, months(2005, 2), coords_2x2(), values).unwrap();

    let global = zonal_mean(&ds, None, -90.0, 90.0).unwrap();
    let north = zonal_mean(&ds, None, 0.0, 90.0).unwrap();
    assert!(global[0] > 0.0 && global[0] < 10.0);
    assert!((north[0] - 10.0).abs() < 1e-12);
}

#[test]
fn explicit_weights_drive_the_mean() {
    // All weight on the north row.
    let values = Array3::from_shape_fn((1, 2, 2), |(_, j, _)| 10.0 * j as f64);
    let ds = GriddedDataset::new("tas", None, months(2005, 1), coords_2x2(), values).unwrap();
    let mut areas = Array2::zeros((2, 2));
    areas[(1, 0)] = 1.0;
    areas[(1, 1)] = 1.0;
    let weights = CellAreaWeights::new(areas).unwrap();

    let series = zonal_mean(&ds, Some(&weights), -90.0, 90.0).unwrap();
    assert!((series[0] - 10.0).abs() < 1e-12);
}

#[test]
fn nan_cells_are_skipped() {
    let mut obs_values = Array3::from_elem((1, 2, 2), 1.0);
    obs_values[(0, 0, 0)] = f64::NAN;
    let obs = GriddedDataset::new("tas", None, months(2005, 1), coords_2x2(), obs_values).unwrap();
    let calc = MetricCalculation::new(constant("tas", 3.0, 1), obs, vec![], None).unwrap();
    let mae = scalar(
        calc.calculate(
            MetricKind::Mae,
            Reduction::ZonalMean,
            Adjustment::None,
            None,
            -90.0,
            90.0,
        )
        .unwrap(),
    );
    // Remaining cells all differ by 2.0.
    assert!((mae - 2.0).abs() < 1e-12);
}

#[test]
fn invalid_bounds_are_rejected() {
    let calc = MetricCalculation::new(
        constant("tas", 1.0, 2),
        constant("tas", 1.0, 2),
        vec![],
        None,
    )
    .unwrap();
    let err = calc
        .calculate(
            MetricKind::Rmse,
            Reduction::ZonalMean,
            Adjustment::None,
            None,
            45.0,
            -45.0,
        )
        .unwrap_err();
    assert!(matches!(err, MetricError::InvalidBounds { .. }));
}
