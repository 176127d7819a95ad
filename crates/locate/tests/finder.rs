//! Integration tests for the data finder over a local cache of fixture
//! files, mimicking the archive directory layout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cbench_grid::MonthKey;
use cbench_locate::{
    DataFinder, DataQuery, FinderConfig, LocalCache, LocateError, Location, ModelSpec,
    ObservationRegistry, ObservationSpec, OceanLayer, Resolver,
};
use cbench_store::{MemoryStore, ObjectStore};
use tempfile::TempDir;

fn days_in_month(year: i32, month: u32) -> f64 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31.0,
        4 | 6 | 9 | 11 => 30.0,
        2 => {
            if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 {
                29.0
            } else {
                28.0
            }
        }
        other => panic!("bad month {other}"),
    }
}

/// Mid-month offsets in days since January 1 of `start_year`.
fn monthly_offsets(start_year: i32, n_months: usize) -> Vec<f64> {
    let mut offsets = Vec::with_capacity(n_months);
    let mut elapsed = 0.0;
    let mut year = start_year;
    let mut month = 1;
    for _ in 0..n_months {
        offsets.push(elapsed + 14.0);
        elapsed += days_in_month(year, month);
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    offsets
}

fn write_monthly(path: &Path, variable: &str, start_year: i32, n_months: usize, value: f64) {
    let mut file = netcdf::create(path).unwrap();
    file.add_dimension("time", n_months).unwrap();
    file.add_dimension("lat", 2).unwrap();
    file.add_dimension("lon", 2).unwrap();

    let units = format!("days since {start_year}-01-01");
    let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
    time.put_attribute("units", units.as_str()).unwrap();
    time.put_attribute("calendar", "standard").unwrap();
    time.put_values(&monthly_offsets(start_year, n_months), ..)
        .unwrap();

    let mut lat = file.add_variable::<f64>("lat", &["lat"]).unwrap();
    lat.put_attribute("units", "degrees_north").unwrap();
    lat.put_values(&[-30.0, 30.0], ..).unwrap();
    let mut lon = file.add_variable::<f64>("lon", &["lon"]).unwrap();
    lon.put_attribute("units", "degrees_east").unwrap();
    lon.put_values(&[90.0, 270.0], ..).unwrap();

    let mut var = file
        .add_variable::<f64>(variable, &["time", "lat", "lon"])
        .unwrap();
    var.put_attribute("units", "K").unwrap();
    var.put_values(&vec![value; n_months * 4], ..).unwrap();
}

fn write_monthly_layered(path: &Path, variable: &str, start_year: i32, n_months: usize, value: f64) {
    let mut file = netcdf::create(path).unwrap();
    file.add_dimension("time", n_months).unwrap();
    file.add_dimension("lev", 2).unwrap();
    file.add_dimension("lat", 2).unwrap();
    file.add_dimension("lon", 2).unwrap();

    let units = format!("days since {start_year}-01-01");
    let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
    time.put_attribute("units", units.as_str()).unwrap();
    time.put_attribute("calendar", "standard").unwrap();
    time.put_values(&monthly_offsets(start_year, n_months), ..)
        .unwrap();

    let mut lev = file.add_variable::<f64>("lev", &["lev"]).unwrap();
    lev.put_attribute("units", "m").unwrap();
    lev.put_values(&[50.0, 150.0], ..).unwrap();
    let mut lat = file.add_variable::<f64>("lat", &["lat"]).unwrap();
    lat.put_attribute("units", "degrees_north").unwrap();
    lat.put_values(&[-30.0, 30.0], ..).unwrap();
    let mut lon = file.add_variable::<f64>("lon", &["lon"]).unwrap();
    lon.put_attribute("units", "degrees_east").unwrap();
    lon.put_values(&[90.0, 270.0], ..).unwrap();

    let mut var = file
        .add_variable::<f64>(variable, &["time", "lev", "lat", "lon"])
        .unwrap();
    var.put_values(&vec![value; n_months * 2 * 4], ..).unwrap();
}

fn spec() -> ModelSpec {
    ModelSpec {
        institution: "CSIRO-ARCCSS".to_string(),
        model: "ACCESS-CM2".to_string(),
    }
}

fn cache_dir(
    root: &Path,
    activity: &str,
    experiment: &str,
    member: &str,
    table: &str,
    variable: &str,
) -> PathBuf {
    let dir = root
        .join("CMIP6")
        .join(activity)
        .join("CSIRO-ARCCSS")
        .join("ACCESS-CM2")
        .join(experiment)
        .join(member)
        .join(table)
        .join(variable)
        .join("gn")
        .join("v20200101");
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn config(members: &[&str]) -> FinderConfig {
    FinderConfig {
        historical_start: MonthKey::first(2013),
        historical_end: MonthKey::last(2014),
        projection_start: MonthKey::first(2015),
        projection_end: MonthKey::last(2016),
        projection_experiment: "ssp245".to_string(),
        ensemble_members: members.iter().map(|m| m.to_string()).collect(),
        snap_coordinates: false,
    }
}

fn finder_over(root: &Path, config: FinderConfig) -> DataFinder {
    let resolvers: Vec<Box<dyn Resolver>> = vec![Box::new(LocalCache::new(root))];
    DataFinder::new(
        config,
        resolvers,
        Arc::new(MemoryStore::new()),
        ObservationRegistry::builtin(),
    )
}

fn seed_member(root: &Path, member: &str, value: f64) {
    let dir = cache_dir(root, "CMIP", "historical", member, "Amon", "tas");
    write_monthly(&dir.join("tas_hist.nc"), "tas", 2013, 24, value);
    let dir = cache_dir(root, "ScenarioMIP", "ssp245", member, "Amon", "tas");
    write_monthly(&dir.join("tas_ssp.nc"), "tas", 2015, 24, value);
}

#[test]
fn member_series_joins_historical_and_projection() {
    let root = TempDir::new().unwrap();
    seed_member(root.path(), "r1i1p1f1", 280.0);
    let finder = finder_over(root.path(), config(&["r1i1p1f1"]));

    let series = finder.load_member(&spec(), "r1i1p1f1", "tas").unwrap();
    assert_eq!(series.n_times(), 48);
    assert_eq!(series.times()[0], MonthKey::new(2013, 1).unwrap());
    assert_eq!(*series.times().last().unwrap(), MonthKey::new(2016, 12).unwrap());
    // Seam months are consecutive.
    let dec = MonthKey::new(2014, 12).unwrap();
    let jan = MonthKey::new(2015, 1).unwrap();
    let i = series.times().iter().position(|t| *t == dec).unwrap();
    assert_eq!(series.times()[i + 1], jan);
}

#[test]
fn overlapping_projection_is_a_time_alignment_error() {
    let root = TempDir::new().unwrap();
    let dir = cache_dir(root.path(), "CMIP", "historical", "r1i1p1f1", "Amon", "tas");
    write_monthly(&dir.join("tas_hist.nc"), "tas", 2013, 24, 280.0);
    // Projection files that start back in 2014.
    let dir = cache_dir(root.path(), "ScenarioMIP", "ssp245", "r1i1p1f1", "Amon", "tas");
    write_monthly(&dir.join("tas_ssp.nc"), "tas", 2014, 36, 281.0);

    let mut cfg = config(&["r1i1p1f1"]);
    cfg.projection_start = MonthKey::first(2014);
    let finder = finder_over(root.path(), cfg);

    assert!(matches!(
        finder.load_member(&spec(), "r1i1p1f1", "tas").unwrap_err(),
        LocateError::TimeAlignment { .. }
    ));
}

#[test]
fn wide_seam_gap_is_rejected() {
    let root = TempDir::new().unwrap();
    let dir = cache_dir(root.path(), "CMIP", "historical", "r1i1p1f1", "Amon", "tas");
    write_monthly(&dir.join("tas_hist.nc"), "tas", 2013, 24, 280.0);
    // Projection only available from 2016 onwards.
    let dir = cache_dir(root.path(), "ScenarioMIP", "ssp245", "r1i1p1f1", "Amon", "tas");
    write_monthly(&dir.join("tas_ssp.nc"), "tas", 2016, 12, 281.0);

    let finder = finder_over(root.path(), config(&["r1i1p1f1"]));
    assert!(matches!(
        finder.load_member(&spec(), "r1i1p1f1", "tas").unwrap_err(),
        LocateError::TimeAlignment { .. }
    ));
}

#[test]
fn missing_member_is_ensemble_not_found() {
    let root = TempDir::new().unwrap();
    seed_member(root.path(), "r1i1p1f1", 280.0);
    let finder = finder_over(root.path(), config(&["r1i1p1f1", "r9i1p1f1"]));

    match finder.load_members(&spec(), "tas").unwrap_err() {
        LocateError::EnsembleNotFound { model, member } => {
            assert_eq!(model, "ACCESS-CM2");
            assert_eq!(member, "r9i1p1f1");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn model_load_takes_the_ensemble_mean() {
    let root = TempDir::new().unwrap();
    seed_member(root.path(), "r1i1p1f1", 1.0);
    seed_member(root.path(), "r2i1p1f1", 3.0);
    let finder = finder_over(root.path(), config(&["r1i1p1f1", "r2i1p1f1"]));

    let mean = finder.load_model(&spec(), "tas").unwrap();
    assert_eq!(mean.n_times(), 48);
    for v in mean.values() {
        assert!((v - 2.0).abs() < 1e-12);
    }
}

#[test]
fn find_members_scans_the_cache() {
    let root = TempDir::new().unwrap();
    seed_member(root.path(), "r1i1p1f1", 280.0);
    seed_member(root.path(), "r2i1p1f1", 281.0);
    // A different physics family is ignored.
    let dir = cache_dir(root.path(), "CMIP", "historical", "r1i1p2f1", "Amon", "tas");
    write_monthly(&dir.join("tas_hist.nc"), "tas", 2013, 24, 280.0);

    let finder = finder_over(root.path(), config(&["r1i1p1f1"]));
    let members = finder.find_members(&spec(), "tas").unwrap();
    assert_eq!(members, vec!["r1i1p1f1", "r2i1p1f1"]);
}

#[test]
fn observations_are_renamed_to_the_canonical_variable() {
    let root = TempDir::new().unwrap();
    let obs_path = root.path().join("tas_obs.nc");
    write_monthly(&obs_path, "tas_mean", 2013, 48, 0.7);

    let mut registry = ObservationRegistry::builtin();
    registry.insert(
        "tas",
        "HadCRUT5",
        ObservationSpec {
            source_variable: "tas_mean".to_string(),
            local_path: Some(obs_path),
            store_key: None,
            units: Some("K".to_string()),
            long_name: None,
        },
    );
    let finder = DataFinder::new(
        config(&["r1i1p1f1"]),
        vec![Box::new(LocalCache::new(root.path()))],
        Arc::new(MemoryStore::new()),
        registry,
    );

    let obs = finder.load_obs("tas", None).unwrap();
    assert_eq!(obs.variable(), "tas");
    assert_eq!(obs.units(), Some("K"));
    assert_eq!(obs.n_times(), 48);
}

#[test]
fn observations_fall_back_to_the_object_store() {
    let root = TempDir::new().unwrap();
    let obs_path = root.path().join("staged.nc");
    write_monthly(&obs_path, "sst", 2013, 48, 18.0);
    let store = Arc::new(MemoryStore::new());
    store
        .put("observations/tos_noaa_oisst.nc", &std::fs::read(&obs_path).unwrap())
        .unwrap();

    let finder = DataFinder::new(
        config(&["r1i1p1f1"]),
        vec![Box::new(LocalCache::new(root.path()))],
        store,
        ObservationRegistry::builtin(),
    );

    let obs = finder.load_obs("tos", None).unwrap();
    assert_eq!(obs.variable(), "tos");
    assert_eq!(obs.n_times(), 48);
}

#[test]
fn unregistered_observation_variable_fails() {
    let root = TempDir::new().unwrap();
    let finder = finder_over(root.path(), config(&["r1i1p1f1"]));
    assert!(matches!(
        finder.load_obs("zg500", None).unwrap_err(),
        LocateError::UnknownObservation { .. }
    ));
}

#[test]
fn store_objects_resolve_through_staging() {
    struct StoreOnly;

    impl Resolver for StoreOnly {
        fn name(&self) -> &str {
            "store-only"
        }

        fn resolve(&self, query: &DataQuery) -> Result<Option<Location>, LocateError> {
            Ok(Some(Location::StoreObject(format!(
                "archive/{}/{}.nc",
                query.experiment, query.variable
            ))))
        }
    }

    let root = TempDir::new().unwrap();
    let hist = root.path().join("hist.nc");
    write_monthly(&hist, "tas", 2013, 24, 280.0);
    let ssp = root.path().join("ssp.nc");
    write_monthly(&ssp, "tas", 2015, 24, 281.0);
    let store = Arc::new(MemoryStore::new());
    store
        .put("archive/historical/tas.nc", &std::fs::read(&hist).unwrap())
        .unwrap();
    store
        .put("archive/ssp245/tas.nc", &std::fs::read(&ssp).unwrap())
        .unwrap();

    let finder = DataFinder::new(
        config(&["r1i1p1f1"]),
        vec![Box::new(StoreOnly)],
        store,
        ObservationRegistry::builtin(),
    );
    let series = finder.load_member(&spec(), "r1i1p1f1", "tas").unwrap();
    assert_eq!(series.n_times(), 48);
}

#[test]
fn absent_cell_area_means_cosine_fallback() {
    let root = TempDir::new().unwrap();
    seed_member(root.path(), "r1i1p1f1", 280.0);
    let finder = finder_over(root.path(), config(&["r1i1p1f1"]));
    assert!(finder.load_cell_area(&spec(), "tas").unwrap().is_none());
}

#[test]
fn cell_area_reads_from_the_fixed_table() {
    let root = TempDir::new().unwrap();
    seed_member(root.path(), "r1i1p1f1", 280.0);
    let dir = cache_dir(root.path(), "CMIP", "historical", "r1i1p1f1", "fx", "areacella");
    {
        let mut file = netcdf::create(dir.join("areacella.nc")).unwrap();
        file.add_dimension("lat", 2).unwrap();
        file.add_dimension("lon", 2).unwrap();
        let mut var = file
            .add_variable::<f64>("areacella", &["lat", "lon"])
            .unwrap();
        var.put_values(&[1.0e10, 1.0e10, 2.0e10, 2.0e10], ..).unwrap();
    }

    let finder = finder_over(root.path(), config(&["r1i1p1f1"]));
    let weights = finder.load_cell_area(&spec(), "tas").unwrap().unwrap();
    assert_eq!(weights.shape(), (2, 2));
    assert_eq!(weights.areas()[(1, 0)], 2.0e10);
}

#[test]
fn ocean_heat_content_derives_from_columns() {
    let root = TempDir::new().unwrap();
    for variable in ["thetao", "so"] {
        let dir = cache_dir(root.path(), "CMIP", "historical", "r1i1p1f1", "Omon", variable);
        let value = if variable == "thetao" { 10.0 } else { 35.0 };
        write_monthly_layered(&dir.join(format!("{variable}_hist.nc")), variable, 2013, 24, value);
    }

    // Historical only.
    let mut cfg = config(&["r1i1p1f1"]);
    cfg.projection_end = MonthKey::last(2014);
    cfg.projection_start = MonthKey::first(2015);
    let finder = finder_over(root.path(), cfg);

    let members = finder.load_ohc_members(&spec(), OceanLayer::Mixed).unwrap();
    assert_eq!(members.len(), 1);
    let ohc = &members[0];
    assert_eq!(ohc.variable(), "ohc");
    assert_eq!(ohc.units(), Some("J m-2"));
    assert_eq!(ohc.n_times(), 24);
    // Constant temperature means zero anomaly heat.
    for v in ohc.values() {
        assert!(v.abs() < 1e-9);
    }
}
