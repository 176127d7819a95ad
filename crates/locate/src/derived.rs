//! Variables derived from other model output rather than published as-is.
//!
//! Ocean heat content is the only derived variable today. It is computed
//! from potential temperature and salinity columns: the temperature anomaly
//! against the dataset's own time mean is converted to heat per unit area
//! with a linearized equation of state, then integrated over a depth layer.

use cbench_grid::{GridError, GriddedDataset, LayeredDataset};
use ndarray::{Array3, Axis};
use tracing::debug;

use crate::error::LocateError;

/// Reference density of seawater, kg m^-3.
pub const RHO_REF: f64 = 1025.0;
/// Thermal expansion coefficient, K^-1.
pub const ALPHA: f64 = 2.0e-4;
/// Haline contraction coefficient, (g/kg)^-1.
pub const BETA: f64 = 7.6e-4;
/// Reference temperature for the expansion, degC.
pub const T_REF: f64 = 10.0;
/// Reference salinity for the contraction, g/kg.
pub const S_REF: f64 = 35.0;
/// Specific heat capacity of seawater, J kg^-1 K^-1.
pub const CP_REF: f64 = 3991.9;

/// How a variable name is fulfilled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableKind {
    /// Published directly by the model.
    Direct,
    /// Computed from other published variables.
    Derived {
        /// Variables the computation reads.
        inputs: &'static [&'static str],
    },
}

/// Classify a variable short name.
pub fn classify(variable: &str) -> VariableKind {
    match variable {
        "ohc" => VariableKind::Derived {
            inputs: &["thetao", "so"],
        },
        _ => VariableKind::Direct,
    }
}

/// Depth layer the heat content is integrated over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OceanLayer {
    /// The mixed layer, 0 to 100 m.
    Mixed,
    /// The deep layer, 0 to 2000 m.
    Deep,
}

impl OceanLayer {
    /// (top, bottom) depth bounds in metres.
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            OceanLayer::Mixed => (0.0, 100.0),
            OceanLayer::Deep => (0.0, 2000.0),
        }
    }

    /// Label used in results and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            OceanLayer::Mixed => "mixed",
            OceanLayer::Deep => "deep",
        }
    }
}

impl std::str::FromStr for OceanLayer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mixed" => Ok(OceanLayer::Mixed),
            "deep" => Ok(OceanLayer::Deep),
            other => Err(format!("unknown ocean layer '{other}', expected 'mixed' or 'deep'")),
        }
    }
}

/// Per-level thickness in metres contributed to `[top, bottom]`.
///
/// Cell interfaces sit midway between level centres, with the top of the
/// first cell at the surface and the last cell extending symmetrically.
fn layer_thickness(levels: &[f64], top: f64, bottom: f64) -> Vec<f64> {
    let n = levels.len();
    let mut thickness = vec![0.0; n];
    for l in 0..n {
        let cell_top = if l == 0 {
            0.0
        } else {
            0.5 * (levels[l - 1] + levels[l])
        };
        let cell_bottom = if l + 1 < n {
            0.5 * (levels[l] + levels[l + 1])
        } else {
            levels[n - 1] + (levels[n - 1] - cell_top)
        };
        thickness[l] = (cell_bottom.min(bottom) - cell_top.max(top)).max(0.0);
    }
    thickness
}

/// Ocean heat content per unit area, J m^-2.
///
/// The temperature anomaly is taken against the column's own time mean, so
/// the result measures heat gained or lost over the loaded period rather
/// than absolute content. Cells that are dry (NaN) at any level inside the
/// layer stay NaN.
///
/// # Errors
///
/// Returns [`LocateError::Grid`] when the temperature and salinity fields
/// disagree in shape, times or levels.
pub fn ocean_heat_content(
    thetao: &LayeredDataset,
    so: &LayeredDataset,
    layer: OceanLayer,
) -> Result<GriddedDataset, LocateError> {
    if thetao.values().dim() != so.values().dim()
        || thetao.times() != so.times()
        || thetao.levels() != so.levels()
    {
        return Err(GridError::DimensionMismatch {
            name: "thetao/so".into(),
            expected: thetao.values().len(),
            got: so.values().len(),
        }
        .into());
    }

    let (top, bottom) = layer.bounds();
    let thickness = layer_thickness(thetao.levels(), top, bottom);
    debug!(
        layer = layer.label(),
        levels = thetao.levels().len(),
        active = thickness.iter().filter(|t| **t > 0.0).count(),
        "integrating heat content"
    );

    // Climatology: plain time mean per (level, cell).
    let climatology = thetao.values().mean_axis(Axis(0)).ok_or_else(|| {
        LocateError::Grid(GridError::DimensionMismatch {
            name: "time".into(),
            expected: 1,
            got: 0,
        })
    })?;

    let (nt, nl, ny, nx) = thetao.values().dim();
    let mut ohc = Array3::<f64>::zeros((nt, ny, nx));
    let t = thetao.values();
    let s = so.values();
    for ti in 0..nt {
        for j in 0..ny {
            for i in 0..nx {
                let mut total = 0.0;
                for l in 0..nl {
                    if thickness[l] <= 0.0 {
                        continue;
                    }
                    let temp = t[[ti, l, j, i]];
                    let salt = s[[ti, l, j, i]];
                    let anom = temp - climatology[[l, j, i]];
                    let rho = RHO_REF * (1.0 - ALPHA * (temp - T_REF) + BETA * (salt - S_REF));
                    // NaN at any wet level poisons the column, as intended.
                    total += rho * CP_REF * anom * thickness[l];
                }
                ohc[[ti, j, i]] = total;
            }
        }
    }

    let result = GriddedDataset::new(
        "ohc",
        Some("J m-2".to_string()),
        thetao.times().to_vec(),
        thetao.coords().clone(),
        ohc,
    )
    .map_err(LocateError::Grid)?;
    Ok(result)
}
