//! Coordinate standardization.
//!
//! Source files name and orient their coordinate axes inconsistently; every
//! dataset passes through [`standardize`] once at load time so that downstream
//! code can rely on a single convention: latitude ascending in [-90, 90],
//! longitude in [0, 360) and ascending on rectilinear grids, time strictly
//! increasing at monthly cadence.

use ndarray::Axis;

use crate::dataset::{Coords, GriddedDataset, LayeredDataset};
use crate::month::MonthKey;

/// Accepted names for the latitude coordinate, checked in order.
pub const LAT_ALIASES: &[&str] = &["lat", "latitude", "Latitude", "Lat", "nav_lat", "y"];

/// Accepted names for the longitude coordinate, checked in order.
pub const LON_ALIASES: &[&str] = &["lon", "longitude", "Longitude", "Lon", "nav_lon", "x"];

/// Accepted names for the time coordinate, checked in order.
pub const TIME_ALIASES: &[&str] = &["time", "Time", "time_counter", "t"];

/// Accepted names for the vertical coordinate, checked in order.
pub const LEVEL_ALIASES: &[&str] = &["lev", "depth", "deptht", "olevel", "plev", "z"];

/// Options controlling [`standardize`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardizeOptions {
    /// Replace rectilinear coordinates with the idealized evenly-spaced
    /// cell-centre sequence implied by the grid shape. Used when comparing
    /// datasets whose nominal grids match but whose stored coordinates carry
    /// small numeric differences. Ignored for curvilinear grids.
    pub snap_coordinates: bool,
}

/// Bring a dataset into canonical coordinate form.
///
/// Infallible and idempotent: applying it to an already-standardized dataset
/// returns an equal dataset.
pub fn standardize(dataset: GriddedDataset, options: &StandardizeOptions) -> GriddedDataset {
    let (variable, units, times, coords, values) = dataset.into_parts();

    // Latitude ascending.
    let (mut coords, mut values) = match coords {
        Coords::Rectilinear { mut lat, lon } => {
            let mut values = values;
            if lat_descending(&lat) {
                lat.reverse();
                values.invert_axis(Axis(1));
            }
            (Coords::Rectilinear { lat, lon }, values)
        }
        Coords::Curvilinear { mut lat, mut lon } => {
            let mut values = values;
            let first_col: Vec<f64> = (0..lat.nrows()).map(|j| lat[(j, 0)]).collect();
            if lat_descending(&first_col) {
                lat.invert_axis(Axis(0));
                lon.invert_axis(Axis(0));
                values.invert_axis(Axis(1));
            }
            (Coords::Curvilinear { lat, lon }, values)
        }
    };

    // Longitude into [0, 360), columns re-sorted to keep the axis monotone.
    // Curvilinear longitudes are remapped in place; there is no meaningful
    // column order to restore on those grids.
    match &mut coords {
        Coords::Rectilinear { lon, .. } => {
            for l in lon.iter_mut() {
                *l = wrap_lon(*l);
            }
            let perm = sort_permutation(lon);
            if !is_identity(&perm) {
                let sorted: Vec<f64> = perm.iter().map(|&i| lon[i]).collect();
                *lon = sorted;
                values = values.select(Axis(2), &perm);
            }
        }
        Coords::Curvilinear { lon, .. } => {
            for l in lon.iter_mut() {
                *l = wrap_lon(*l);
            }
        }
    }

    // Time strictly increasing.
    let (times, values) = sort_time(times, values, 0);

    // Optional idealized coordinates.
    let coords = if options.snap_coordinates {
        snap_rectilinear(coords)
    } else {
        coords
    };

    GriddedDataset::from_parts(variable, units, times, coords, values)
}

/// [`standardize`] for depth-resolved datasets. The vertical axis is left
/// untouched; levels are validated at construction.
pub fn standardize_layered(
    dataset: LayeredDataset,
    options: &StandardizeOptions,
) -> LayeredDataset {
    let (variable, units, times, levels, coords, mut values) = dataset.into_parts();

    let mut coords = match coords {
        Coords::Rectilinear { mut lat, lon } => {
            if lat_descending(&lat) {
                lat.reverse();
                values.invert_axis(Axis(2));
            }
            Coords::Rectilinear { lat, lon }
        }
        Coords::Curvilinear { mut lat, mut lon } => {
            let first_col: Vec<f64> = (0..lat.nrows()).map(|j| lat[(j, 0)]).collect();
            if lat_descending(&first_col) {
                lat.invert_axis(Axis(0));
                lon.invert_axis(Axis(0));
                values.invert_axis(Axis(2));
            }
            Coords::Curvilinear { lat, lon }
        }
    };

    match &mut coords {
        Coords::Rectilinear { lon, .. } => {
            for l in lon.iter_mut() {
                *l = wrap_lon(*l);
            }
            let perm = sort_permutation(lon);
            if !is_identity(&perm) {
                let sorted: Vec<f64> = perm.iter().map(|&i| lon[i]).collect();
                *lon = sorted;
                values = values.select(Axis(3), &perm);
            }
        }
        Coords::Curvilinear { lon, .. } => {
            for l in lon.iter_mut() {
                *l = wrap_lon(*l);
            }
        }
    }

    let perm = time_permutation(&times);
    let (times, values) = if is_identity(&perm) {
        (times, values)
    } else {
        let sorted: Vec<MonthKey> = perm.iter().map(|&i| times[i]).collect();
        (sorted, values.select(Axis(0), &perm))
    };

    let coords = if options.snap_coordinates {
        snap_rectilinear(coords)
    } else {
        coords
    };

    LayeredDataset::from_parts(variable, units, times, levels, coords, values)
}

fn lat_descending(lat: &[f64]) -> bool {
    lat.len() >= 2 && lat[0] > lat[lat.len() - 1]
}

fn wrap_lon(lon: f64) -> f64 {
    let wrapped = lon.rem_euclid(360.0);
    // rem_euclid can return 360.0 for tiny negative inputs.
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

fn sort_permutation(values: &[f64]) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..values.len()).collect();
    perm.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    perm
}

fn time_permutation(times: &[MonthKey]) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..times.len()).collect();
    perm.sort_by_key(|&i| times[i]);
    perm
}

fn is_identity(perm: &[usize]) -> bool {
    perm.iter().enumerate().all(|(i, &p)| i == p)
}

fn sort_time(
    times: Vec<MonthKey>,
    values: ndarray::Array3<f64>,
    axis: usize,
) -> (Vec<MonthKey>, ndarray::Array3<f64>) {
    let perm = time_permutation(&times);
    if is_identity(&perm) {
        (times, values)
    } else {
        let sorted: Vec<MonthKey> = perm.iter().map(|&i| times[i]).collect();
        (sorted, values.select(Axis(axis), &perm))
    }
}

/// Replace rectilinear coordinates with the idealized evenly-spaced
/// cell-centre sequences implied by the grid shape.
fn snap_rectilinear(coords: Coords) -> Coords {
    match coords {
        Coords::Rectilinear { lat, lon } => {
            let ny = lat.len();
            let nx = lon.len();
            let lat_res = 180.0 / ny as f64;
            let lon_res = 360.0 / nx as f64;
            let lat = (0..ny)
                .map(|j| -90.0 + lat_res / 2.0 + j as f64 * lat_res)
                .collect();
            let lon = (0..nx)
                .map(|i| lon_res / 2.0 + i as f64 * lon_res)
                .collect();
            Coords::Rectilinear { lat, lon }
        }
        curvilinear => curvilinear,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    fn month(y: i32, m: u32) -> MonthKey {
        MonthKey::new(y, m).unwrap()
    }

    fn indexed_values(nt: usize, ny: usize, nx: usize) -> Array3<f64> {
        Array3::from_shape_fn((nt, ny, nx), |(t, j, i)| {
            (t * 10_000 + j * 100 + i) as f64
        })
    }

    #[test]
    fn descending_latitude_is_reversed_with_data() {
        let ds = GriddedDataset::new(
            "tas",
            None,
            vec![month(2000, 1)],
            Coords::Rectilinear {
                lat: vec![60.0, 0.0, -60.0],
                lon: vec![0.0, 90.0],
            },
            indexed_values(1, 3, 2),
        )
        .unwrap();
        let std = standardize(ds, &StandardizeOptions::default());
        match std.coords() {
            Coords::Rectilinear { lat, .. } => assert_eq!(lat, &vec![-60.0, 0.0, 60.0]),
            _ => panic!("expected rectilinear"),
        }
        // Row that was at j=2 (lat -60) is now at j=0.
        assert_eq!(std.values()[(0, 0, 0)], 200.0);
        assert_eq!(std.values()[(0, 2, 1)], 1.0);
    }

    #[test]
    fn longitude_wraps_and_resorts_columns() {
        let ds = GriddedDataset::new(
            "tas",
            None,
            vec![month(2000, 1)],
            Coords::Rectilinear {
                lat: vec![0.0],
                lon: vec![-90.0, 0.0, 90.0, 180.0],
            },
            indexed_values(1, 1, 4),
        )
        .unwrap();
        let std = standardize(ds, &StandardizeOptions::default());
        match std.coords() {
            Coords::Rectilinear { lon, .. } => {
                assert_eq!(lon, &vec![0.0, 90.0, 180.0, 270.0]);
            }
            _ => panic!("expected rectilinear"),
        }
        // -90 wrapped to 270 and moved to the last column.
        assert_eq!(std.values()[(0, 0, 3)], 0.0);
        assert_eq!(std.values()[(0, 0, 0)], 1.0);
    }

    #[test]
    fn time_axis_is_sorted_with_data() {
        let ds = GriddedDataset::new(
            "tas",
            None,
            vec![month(2000, 3), month(2000, 1), month(2000, 2)],
            Coords::Rectilinear {
                lat: vec![0.0],
                lon: vec![0.0],
            },
            indexed_values(3, 1, 1),
        )
        .unwrap();
        let std = standardize(ds, &StandardizeOptions::default());
        assert!(std.times_sorted());
        assert_eq!(std.times()[0], month(2000, 1));
        assert_eq!(std.values()[(0, 0, 0)], 10_000.0);
        assert_eq!(std.values()[(2, 0, 0)], 0.0);
    }

    #[test]
    fn snap_coordinates_produces_ideal_centres() {
        let ds = GriddedDataset::new(
            "tas",
            None,
            vec![month(2000, 1)],
            Coords::Rectilinear {
                lat: vec![-44.7, 45.2],
                lon: vec![89.9, 270.4],
            },
            indexed_values(1, 2, 2),
        )
        .unwrap();
        let std = standardize(
            ds,
            &StandardizeOptions {
                snap_coordinates: true,
            },
        );
        match std.coords() {
            Coords::Rectilinear { lat, lon } => {
                assert_eq!(lat, &vec![-45.0, 45.0]);
                assert_eq!(lon, &vec![90.0, 270.0]);
            }
            _ => panic!("expected rectilinear"),
        }
    }

    #[test]
    fn curvilinear_descending_j_is_reversed() {
        let lat = Array2::from_shape_fn((3, 2), |(j, _)| 60.0 - 60.0 * j as f64);
        let lon = Array2::from_shape_fn((3, 2), |(_, i)| i as f64 * 90.0);
        let ds = GriddedDataset::new(
            "tos",
            None,
            vec![month(2000, 1)],
            Coords::curvilinear(lat, lon).unwrap(),
            indexed_values(1, 3, 2),
        )
        .unwrap();
        let std = standardize(ds, &StandardizeOptions::default());
        assert_eq!(std.coords().cell_lat(0, 0), -60.0);
        assert_eq!(std.coords().cell_lat(2, 0), 60.0);
        assert_eq!(std.values()[(0, 0, 0)], 200.0);
    }

    #[test]
    fn standardize_is_idempotent() {
        let ds = GriddedDataset::new(
            "tas",
            None,
            vec![month(2000, 2), month(2000, 1)],
            Coords::Rectilinear {
                lat: vec![30.0, -30.0],
                lon: vec![-120.0, 60.0],
            },
            indexed_values(2, 2, 2),
        )
        .unwrap();
        let opts = StandardizeOptions::default();
        let once = standardize(ds, &opts);
        let twice = standardize(once.clone(), &opts);
        assert_eq!(once.times(), twice.times());
        assert_eq!(once.coords(), twice.coords());
        assert_eq!(once.values(), twice.values());
    }

    #[test]
    fn layered_standardize_reverses_latitude() {
        let ds = LayeredDataset::new(
            "thetao",
            None,
            vec![month(2000, 1)],
            vec![50.0, 150.0],
            Coords::Rectilinear {
                lat: vec![30.0, -30.0],
                lon: vec![0.0],
            },
            ndarray::Array4::from_shape_fn((1, 2, 2, 1), |(_, l, j, _)| (l * 10 + j) as f64),
        )
        .unwrap();
        let std = standardize_layered(ds, &StandardizeOptions::default());
        match std.coords() {
            Coords::Rectilinear { lat, .. } => assert_eq!(lat, &vec![-30.0, 30.0]),
            _ => panic!("expected rectilinear"),
        }
        assert_eq!(std.values()[(0, 0, 0, 0)], 1.0);
        assert_eq!(std.values()[(0, 1, 1, 0)], 10.0);
    }

    #[test]
    fn wrap_lon_boundaries() {
        assert_eq!(wrap_lon(360.0), 0.0);
        assert_eq!(wrap_lon(-180.0), 180.0);
        assert_eq!(wrap_lon(0.0), 0.0);
        assert_eq!(wrap_lon(359.5), 359.5);
        assert_eq!(wrap_lon(720.0), 0.0);
    }
}
