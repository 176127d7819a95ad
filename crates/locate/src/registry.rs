//! The observation registry: which reference dataset backs each variable.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::LocateError;

/// Where one observational dataset lives and how to read it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservationSpec {
    /// Variable name inside the source file (often not the CMIP6 short
    /// name).
    pub source_variable: String,
    /// Path on the local filesystem, preferred when present on disk.
    #[serde(default)]
    pub local_path: Option<PathBuf>,
    /// Object-store key to fall back to.
    #[serde(default)]
    pub store_key: Option<String>,
    /// Physical units of the source data.
    #[serde(default)]
    pub units: Option<String>,
    /// Human-readable name.
    #[serde(default)]
    pub long_name: Option<String>,
}

/// Static reference data mapping variable -> source name -> spec, with a
/// primary source per variable. Loaded once at startup; config can add or
/// replace entries.
#[derive(Debug, Clone)]
pub struct ObservationRegistry {
    entries: BTreeMap<String, BTreeMap<String, ObservationSpec>>,
    primary: BTreeMap<String, String>,
}

impl ObservationRegistry {
    /// The built-in registry.
    pub fn builtin() -> Self {
        let mut registry = Self {
            entries: BTreeMap::new(),
            primary: BTreeMap::new(),
        };
        let mut add = |variable: &str,
                       source: &str,
                       source_variable: &str,
                       units: Option<&str>,
                       long_name: &str,
                       primary: bool| {
            registry.insert(
                variable,
                source,
                ObservationSpec {
                    source_variable: source_variable.to_string(),
                    local_path: Some(PathBuf::from(format!(
                        "observations/{variable}_{source}.nc"
                    ))),
                    store_key: Some(format!("observations/{variable}_{source}.nc")),
                    units: units.map(str::to_string),
                    long_name: Some(long_name.to_string()),
                },
            );
            if primary {
                registry.set_primary(variable, source);
            }
        };

        add("tas", "HadCRUT5", "tas_mean", Some("K"), "Near-Surface Air Temperature", true);
        add("tas", "NASA_GISS", "air", Some("K"), "Near-Surface Air Temperature", false);
        add(
            "pr",
            "noaa_gpcp",
            "precip",
            Some("kg m-2 s-1"),
            "Average Monthly Rate of Precipitation",
            true,
        );
        add(
            "tos",
            "noaa_oisst",
            "sst",
            Some("degC"),
            "Sea Surface Temperature",
            true,
        );
        add(
            "clt",
            "nasa_modis",
            "Cloud_Fraction_Mean_Mean",
            Some("percent"),
            "Total Cloud Cover Percentage",
            true,
        );
        add(
            "od550aer",
            "nasa_modis",
            "Aerosol_Optical_Depth_Land_Ocean_Mean_Mean",
            None,
            "Ambient Aerosol Optical Thickness at 550nm",
            true,
        );
        add(
            "ohc",
            "argo",
            "ohc",
            Some("J m-2"),
            "Ocean Heat Content",
            true,
        );
        add(
            "rsut",
            "nasa_ceres",
            "toa_sw_all_mon",
            Some("W m-2"),
            "TOA Outgoing Shortwave Flux, All-Sky",
            true,
        );
        add(
            "rsutcs",
            "nasa_ceres",
            "toa_sw_clr_c_mon",
            Some("W m-2"),
            "TOA Outgoing Shortwave Flux, Clear-Sky",
            true,
        );
        add(
            "rlut",
            "nasa_ceres",
            "toa_lw_all_mon",
            Some("W m-2"),
            "TOA Outgoing Longwave Flux, All-Sky",
            true,
        );
        add(
            "rlutcs",
            "nasa_ceres",
            "toa_lw_clr_c_mon",
            Some("W m-2"),
            "TOA Outgoing Longwave Flux, Clear-Sky",
            true,
        );
        registry
    }

    /// Add or replace one source entry.
    pub fn insert(&mut self, variable: &str, source: &str, spec: ObservationSpec) {
        self.entries
            .entry(variable.to_string())
            .or_default()
            .insert(source.to_string(), spec);
        // First source registered for a variable becomes its primary.
        self.primary
            .entry(variable.to_string())
            .or_insert_with(|| source.to_string());
    }

    /// Mark a source as the variable's default.
    pub fn set_primary(&mut self, variable: &str, source: &str) {
        self.primary
            .insert(variable.to_string(), source.to_string());
    }

    /// Merge config overrides on top of the built-in entries.
    pub fn apply_overrides(
        &mut self,
        overrides: &BTreeMap<String, BTreeMap<String, ObservationSpec>>,
    ) {
        for (variable, sources) in overrides {
            for (source, spec) in sources {
                self.insert(variable, source, spec.clone());
            }
        }
    }

    /// Look up a source for a variable; `source` of `None` selects the
    /// variable's primary source.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::UnknownObservation`] when nothing matches.
    pub fn lookup<'a>(
        &'a self,
        variable: &str,
        source: Option<&'a str>,
    ) -> Result<(&'a str, &'a ObservationSpec), LocateError> {
        let not_found = || LocateError::UnknownObservation {
            variable: variable.to_string(),
            source_name: source.map(str::to_string),
        };
        let sources = self.entries.get(variable).ok_or_else(not_found)?;
        let name = match source {
            Some(name) => name,
            None => self.primary.get(variable).ok_or_else(not_found)?,
        };
        let spec = sources.get(name).ok_or_else(not_found)?;
        Ok((name, spec))
    }

    /// All registered variables.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
