//! Integration tests for the results writer against the in-memory store.

use std::sync::Arc;

use cbench_grid::{Coords, GriddedDataset, MonthKey};
use cbench_metrics::{Adjustment, MetricKind, MetricResult, MetricValue, Period, Reduction};
use cbench_store::{MemoryStore, ObjectStore, ResultsTable, ResultsWriter, StoreError};
use ndarray::Array3;

fn scalar_result(model: &str, period: (i32, i32), value: f64) -> MetricResult {
    MetricResult {
        model: model.to_string(),
        variable: "tas".to_string(),
        metric: MetricKind::Rmse,
        reduction: Reduction::ZonalMean,
        adjustment: Adjustment::None,
        lat_min: -90.0,
        lat_max: 90.0,
        period: Period {
            start_year: period.0,
            end_year: period.1,
        },
        value: MetricValue::Scalar(value),
    }
}

#[test]
fn second_save_updates_the_existing_row() {
    let store = Arc::new(MemoryStore::new());
    let writer = ResultsWriter::new(store.clone(), "historical", "tas");

    writer
        .save_table(&scalar_result("ACCESS-CM2", (2005, 2014), 1.5))
        .unwrap();
    writer
        .save_table(&scalar_result("ACCESS-CM2", (2005, 2014), 1.2))
        .unwrap();

    let table = ResultsTable::from_csv(&store.get(&writer.table_key()).unwrap()).unwrap();
    assert_eq!(table.rows().len(), 1);
    assert_eq!(table.rows()[0].values["2005-2014"], 1.2);
}

#[test]
fn new_period_extends_the_row_instead_of_duplicating() {
    let store = Arc::new(MemoryStore::new());
    let writer = ResultsWriter::new(store.clone(), "historical", "tas");

    writer
        .save_table(&scalar_result("ACCESS-CM2", (2005, 2014), 1.5))
        .unwrap();
    writer
        .save_table(&scalar_result("ACCESS-CM2", (2015, 2024), 1.9))
        .unwrap();

    let table = ResultsTable::from_csv(&store.get(&writer.table_key()).unwrap()).unwrap();
    assert_eq!(table.rows().len(), 1);
    assert_eq!(table.rows()[0].values["2005-2014"], 1.5);
    assert_eq!(table.rows()[0].values["2015-2024"], 1.9);
}

#[test]
fn different_models_keep_separate_rows() {
    let store = Arc::new(MemoryStore::new());
    let writer = ResultsWriter::new(store.clone(), "historical", "tas");

    writer
        .save_table(&scalar_result("ACCESS-CM2", (2005, 2014), 1.5))
        .unwrap();
    writer
        .save_table(&scalar_result("MIROC6", (2005, 2014), 0.8))
        .unwrap();

    let table = ResultsTable::from_csv(&store.get(&writer.table_key()).unwrap()).unwrap();
    assert_eq!(table.rows().len(), 2);
}

#[test]
fn non_scalar_results_are_rejected_by_save_table() {
    let store = Arc::new(MemoryStore::new());
    let writer = ResultsWriter::new(store, "historical", "tas");

    let mut result = scalar_result("ACCESS-CM2", (2005, 2014), 1.5);
    result.value = MetricValue::Series(vec![(MonthKey::new(2005, 1).unwrap(), 1.0)]);
    assert!(matches!(
        writer.save_table(&result).unwrap_err(),
        StoreError::InvalidRow { .. }
    ));
}

#[test]
fn series_and_grids_land_under_the_destination_prefix() {
    let store = Arc::new(MemoryStore::new());
    let writer = ResultsWriter::new(store.clone(), "historical", "tas");

    writer
        .save_series(
            &[
                (MonthKey::new(2005, 1).unwrap(), 0.5),
                (MonthKey::new(2005, 2).unwrap(), f64::NAN),
            ],
            "spatial_rmse",
        )
        .unwrap();

    let ds = GriddedDataset::new(
        "tas",
        Some("K".into()),
        vec![MonthKey::new(2005, 1).unwrap()],
        Coords::Rectilinear {
            lat: vec![0.0],
            lon: vec![180.0],
        },
        Array3::from_elem((1, 1, 1), 2.0),
    )
    .unwrap();
    writer.save_grid(&ds, "temporal_rmse").unwrap();

    let keys = store.list("historical/tas/").unwrap();
    assert!(keys.contains(&"historical/tas/spatial_rmse.csv".to_string()));
    assert!(keys.contains(&"historical/tas/temporal_rmse.nc".to_string()));

    // NaN serializes as an empty cell.
    let csv = String::from_utf8(store.get("historical/tas/spatial_rmse.csv").unwrap()).unwrap();
    assert!(csv.contains("2005-01,0.5"));
    assert!(csv.contains("2005-02,"));
}

#[test]
fn overwrite_clears_only_this_destination() {
    let store = Arc::new(MemoryStore::new());
    store.put("historical/pr/metrics.csv", b"other").unwrap();
    let writer = ResultsWriter::new(store.clone(), "historical", "tas");

    writer
        .save_table(&scalar_result("ACCESS-CM2", (2005, 2014), 1.5))
        .unwrap();
    writer
        .save_series(&[(MonthKey::new(2005, 1).unwrap(), 1.0)], "s")
        .unwrap();

    let removed = writer.overwrite().unwrap();
    assert_eq!(removed, 2);
    assert!(store.list("historical/tas/").unwrap().is_empty());
    assert!(store.exists("historical/pr/metrics.csv").unwrap());
}
