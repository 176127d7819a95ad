//! Writing gridded datasets to NetCDF files.
//!
//! Output files are written from scratch with a fixed layout and fresh
//! attributes; nothing from the source file's encoding (chunking, scale
//! factors, fill values) is carried over.

use std::path::Path;

use cbench_grid::{Coords, GriddedDataset};
use tracing::debug;

use crate::error::IoError;
use crate::time_decode::days_since_1850;

/// Write a dataset to `path`, replacing any existing file.
///
/// Rectilinear grids get `lat`/`lon` coordinate variables; curvilinear grids
/// get `y`/`x` dimensions with 2-D `lat`/`lon` variables.
pub fn write_dataset(path: &Path, dataset: &GriddedDataset) -> Result<(), IoError> {
    if path.exists() {
        std::fs::remove_file(path).map_err(|e| IoError::Netcdf {
            reason: format!("failed to replace {}: {e}", path.display()),
        })?;
    }
    let mut file = netcdf::create(path)?;

    let (ny, nx) = dataset.coords().shape();
    let nt = dataset.n_times();
    file.add_dimension("time", nt)?;

    let time_offsets: Vec<f64> = dataset
        .times()
        .iter()
        .map(|&t| days_since_1850(t))
        .collect::<Result<_, _>>()?;

    match dataset.coords() {
        Coords::Rectilinear { lat, lon } => {
            file.add_dimension("lat", ny)?;
            file.add_dimension("lon", nx)?;

            let mut lat_var = file.add_variable::<f64>("lat", &["lat"])?;
            lat_var.put_attribute("units", "degrees_north")?;
            lat_var.put_attribute("standard_name", "latitude")?;
            lat_var.put_values(lat, ..)?;

            let mut lon_var = file.add_variable::<f64>("lon", &["lon"])?;
            lon_var.put_attribute("units", "degrees_east")?;
            lon_var.put_attribute("standard_name", "longitude")?;
            lon_var.put_values(lon, ..)?;
        }
        Coords::Curvilinear { lat, lon } => {
            file.add_dimension("y", ny)?;
            file.add_dimension("x", nx)?;

            let mut lat_var = file.add_variable::<f64>("lat", &["y", "x"])?;
            lat_var.put_attribute("units", "degrees_north")?;
            lat_var.put_values(&lat.iter().copied().collect::<Vec<f64>>(), ..)?;

            let mut lon_var = file.add_variable::<f64>("lon", &["y", "x"])?;
            lon_var.put_attribute("units", "degrees_east")?;
            lon_var.put_values(&lon.iter().copied().collect::<Vec<f64>>(), ..)?;
        }
    }

    let mut time_var = file.add_variable::<f64>("time", &["time"])?;
    time_var.put_attribute("units", "days since 1850-01-01")?;
    time_var.put_attribute("calendar", "standard")?;
    time_var.put_values(&time_offsets, ..)?;

    let spatial_dims: [&str; 2] = if dataset.coords().is_rectilinear() {
        ["lat", "lon"]
    } else {
        ["y", "x"]
    };
    let dims = ["time", spatial_dims[0], spatial_dims[1]];
    let mut var = file.add_variable::<f64>(dataset.variable(), &dims)?;
    if let Some(units) = dataset.units() {
        var.put_attribute("units", units)?;
    }
    let flat: Vec<f64> = dataset.values().iter().copied().collect();
    var.put_values(&flat, ..)?;

    debug!(
        variable = dataset.variable(),
        path = %path.display(),
        n_times = nt,
        "wrote gridded dataset"
    );
    Ok(())
}
