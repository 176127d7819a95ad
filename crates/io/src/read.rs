//! Reading gridded datasets from NetCDF files.

use std::path::Path;

use cbench_grid::{
    CellAreaWeights, Coords, GriddedDataset, GridError, LayeredDataset, MonthKey, LAT_ALIASES,
    LEVEL_ALIASES, LON_ALIASES, TIME_ALIASES,
};
use ndarray::{Array2, Array3, Array4};
use netcdf::AttributeValue;
use tracing::debug;

use crate::error::IoError;
use crate::time_decode::{decode_times, CfCalendar, TimeUnits};

/// Values with magnitude at or above this are treated as missing even when
/// the file declares no fill value.
const IMPLICIT_FILL_THRESHOLD: f64 = 1e30;

/// Open a NetCDF file at `path`, returning [`IoError::FileNotFound`] if the
/// path does not exist on disk.
pub(crate) fn open_file(path: &Path) -> Result<netcdf::File, IoError> {
    if !path.exists() {
        return Err(IoError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(netcdf::open(path)?)
}

/// Read a 3-D `(time, y, x)` variable into a [`GriddedDataset`].
///
/// Coordinates are identified through the known-name alias tables; a file
/// whose coordinates match none of them is rejected with
/// [`GridError::UnsupportedGrid`]. Declared and implicit fill values are
/// mapped to NaN.
pub fn read_dataset(path: &Path, variable: &str) -> Result<GriddedDataset, IoError> {
    let file = open_file(path)?;
    let var = file
        .variable(variable)
        .ok_or_else(|| IoError::MissingVariable {
            name: variable.to_string(),
            path: path.to_path_buf(),
        })?;
    let dims = var.dimensions();
    if dims.len() != 3 {
        return Err(IoError::UnexpectedRank {
            name: variable.to_string(),
            expected: 3,
            got: dims.len(),
        });
    }
    let shape = (dims[0].len(), dims[1].len(), dims[2].len());

    let coords = read_coords(&file, path)?;
    let times = read_times(&file, path)?;
    let mut data = var.get_values::<f64, _>(..)?;
    mask_fill_values(&var, &mut data);
    let values = Array3::from_shape_vec(shape, data).map_err(|_| GridError::DimensionMismatch {
        name: variable.to_string(),
        expected: shape.0 * shape.1 * shape.2,
        got: 0,
    })?;

    debug!(
        variable,
        path = %path.display(),
        n_times = times.len(),
        "read gridded dataset"
    );
    Ok(GriddedDataset::new(
        variable,
        read_attr_string(&var, "units"),
        times,
        coords,
        values,
    )?)
}

/// Read a 4-D `(time, lev, y, x)` variable into a [`LayeredDataset`].
pub fn read_layered_dataset(path: &Path, variable: &str) -> Result<LayeredDataset, IoError> {
    let file = open_file(path)?;
    let var = file
        .variable(variable)
        .ok_or_else(|| IoError::MissingVariable {
            name: variable.to_string(),
            path: path.to_path_buf(),
        })?;
    let dims = var.dimensions();
    if dims.len() != 4 {
        return Err(IoError::UnexpectedRank {
            name: variable.to_string(),
            expected: 4,
            got: dims.len(),
        });
    }
    let shape = (dims[0].len(), dims[1].len(), dims[2].len(), dims[3].len());

    let coords = read_coords(&file, path)?;
    let times = read_times(&file, path)?;
    let levels = read_levels(&file, path)?;
    let mut data = var.get_values::<f64, _>(..)?;
    mask_fill_values(&var, &mut data);
    let values = Array4::from_shape_vec(shape, data).map_err(|_| GridError::DimensionMismatch {
        name: variable.to_string(),
        expected: shape.0 * shape.1 * shape.2 * shape.3,
        got: 0,
    })?;

    Ok(LayeredDataset::new(
        variable,
        read_attr_string(&var, "units"),
        times,
        levels,
        coords,
        values,
    )?)
}

/// Read a 2-D cell area variable (`areacella`/`areacello`) into weights.
pub fn read_cell_area(path: &Path, variable: &str) -> Result<CellAreaWeights, IoError> {
    let file = open_file(path)?;
    let var = file
        .variable(variable)
        .ok_or_else(|| IoError::MissingVariable {
            name: variable.to_string(),
            path: path.to_path_buf(),
        })?;
    let dims = var.dimensions();
    if dims.len() != 2 {
        return Err(IoError::UnexpectedRank {
            name: variable.to_string(),
            expected: 2,
            got: dims.len(),
        });
    }
    let shape = (dims[0].len(), dims[1].len());
    let mut data = var.get_values::<f64, _>(..)?;
    // Ocean area files mask land with fill values; those cells carry no
    // weight.
    mask_fill_values(&var, &mut data);
    for v in data.iter_mut() {
        if v.is_nan() {
            *v = 0.0;
        }
    }
    let areas = Array2::from_shape_vec(shape, data).map_err(|_| GridError::DimensionMismatch {
        name: variable.to_string(),
        expected: shape.0 * shape.1,
        got: 0,
    })?;
    Ok(CellAreaWeights::new(areas)?)
}

/// Identify and read the spatial coordinates, trying each alias in order.
fn read_coords(file: &netcdf::File, path: &Path) -> Result<Coords, IoError> {
    let lat_var = find_variable(file, LAT_ALIASES).ok_or_else(|| GridError::UnsupportedGrid {
        details: format!(
            "no latitude coordinate among known names in {}",
            path.display()
        ),
    })?;
    let lon_var = find_variable(file, LON_ALIASES).ok_or_else(|| GridError::UnsupportedGrid {
        details: format!(
            "no longitude coordinate among known names in {}",
            path.display()
        ),
    })?;

    match (lat_var.dimensions().len(), lon_var.dimensions().len()) {
        (1, 1) => Ok(Coords::Rectilinear {
            lat: lat_var.get_values::<f64, _>(..)?,
            lon: lon_var.get_values::<f64, _>(..)?,
        }),
        (2, 2) => {
            let ld = lat_var.dimensions();
            let shape = (ld[0].len(), ld[1].len());
            let lat = Array2::from_shape_vec(shape, lat_var.get_values::<f64, _>(..)?)
                .map_err(|_| GridError::UnsupportedGrid {
                    details: "curvilinear latitude shape mismatch".to_string(),
                })?;
            let od = lon_var.dimensions();
            let lon_shape = (od[0].len(), od[1].len());
            let lon = Array2::from_shape_vec(lon_shape, lon_var.get_values::<f64, _>(..)?)
                .map_err(|_| GridError::UnsupportedGrid {
                    details: "curvilinear longitude shape mismatch".to_string(),
                })?;
            Ok(Coords::curvilinear(lat, lon)?)
        }
        (a, b) => Err(GridError::UnsupportedGrid {
            details: format!("latitude is {a}-D and longitude is {b}-D"),
        }
        .into()),
    }
}

/// Decode the time axis into month keys.
fn read_times(file: &netcdf::File, path: &Path) -> Result<Vec<MonthKey>, IoError> {
    let time_var = find_variable(file, TIME_ALIASES).ok_or_else(|| GridError::UnsupportedGrid {
        details: format!("no time coordinate among known names in {}", path.display()),
    })?;
    let units_str = read_attr_string(&time_var, "units").ok_or_else(|| IoError::InvalidTime {
        reason: "time variable has no 'units' attribute".to_string(),
    })?;
    let units = TimeUnits::parse(&units_str)?;
    let calendar_name =
        read_attr_string(&time_var, "calendar").unwrap_or_else(|| "standard".to_string());
    let calendar = CfCalendar::parse(&calendar_name)?;
    let offsets = time_var.get_values::<f64, _>(..)?;
    decode_times(&units, calendar, &offsets)
}

fn read_levels(file: &netcdf::File, path: &Path) -> Result<Vec<f64>, IoError> {
    let lev_var = find_variable(file, LEVEL_ALIASES).ok_or_else(|| GridError::UnsupportedGrid {
        details: format!(
            "no vertical coordinate among known names in {}",
            path.display()
        ),
    })?;
    Ok(lev_var.get_values::<f64, _>(..)?)
}

fn find_variable<'f>(file: &'f netcdf::File, aliases: &[&str]) -> Option<netcdf::Variable<'f>> {
    aliases.iter().find_map(|alias| file.variable(alias))
}

/// Replace declared (`_FillValue`/`missing_value`) and implicit fill values
/// with NaN.
fn mask_fill_values(var: &netcdf::Variable<'_>, data: &mut [f64]) {
    let declared = read_attr_f64(var, "_FillValue").or_else(|| read_attr_f64(var, "missing_value"));
    for v in data.iter_mut() {
        if v.abs() >= IMPLICIT_FILL_THRESHOLD {
            *v = f64::NAN;
        } else if let Some(fill) = declared {
            if *v == fill {
                *v = f64::NAN;
            }
        }
    }
}

fn read_attr_string(var: &netcdf::Variable<'_>, name: &str) -> Option<String> {
    var.attribute_value(name)
        .and_then(|res| res.ok())
        .and_then(|av| match av {
            AttributeValue::Str(s) => Some(s),
            _ => None,
        })
}

fn read_attr_f64(var: &netcdf::Variable<'_>, name: &str) -> Option<f64> {
    var.attribute_value(name)
        .and_then(|res| res.ok())
        .and_then(|av| match av {
            AttributeValue::Double(v) => Some(v),
            AttributeValue::Float(v) => Some(f64::from(v)),
            AttributeValue::Int(v) => Some(f64::from(v)),
            AttributeValue::Short(v) => Some(f64::from(v)),
            _ => None,
        })
}
