//! CF-convention time decoding.
//!
//! CMIP6 files encode time as numeric offsets from a base date under one of
//! several model calendars. Decoding goes straight to [`MonthKey`]s: the day
//! component only matters for working out which month an offset lands in.

use cbench_grid::MonthKey;
use chrono::{Datelike, NaiveDate, TimeDelta};

use crate::error::IoError;

/// Days in each month of a 365-day (no leap) calendar.
const NOLEAP_MONTH_DAYS: [i64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Model calendar named by the CF `calendar` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfCalendar {
    /// Real-world (Gregorian) calendar with leap years.
    Standard,
    /// Fixed 365-day years, no leap days.
    NoLeap,
    /// Twelve 30-day months per year.
    Day360,
}

impl CfCalendar {
    /// Parse a CF `calendar` attribute value.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidTime`] for calendars this crate does not
    /// decode.
    pub fn parse(name: &str) -> Result<Self, IoError> {
        match name {
            "standard" | "gregorian" | "proleptic_gregorian" => Ok(CfCalendar::Standard),
            "noleap" | "365_day" => Ok(CfCalendar::NoLeap),
            "360_day" => Ok(CfCalendar::Day360),
            other => Err(IoError::InvalidTime {
                reason: format!("unsupported calendar '{other}'"),
            }),
        }
    }
}

/// Parsed CF time units: a base date plus a days-per-unit factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    base_year: i32,
    base_month: u32,
    base_day: u32,
    days_per_unit: f64,
}

impl TimeUnits {
    /// Parse a CF units string like `"days since 2000-01-01"` or
    /// `"hours since 1850-01-01 00:00:00"`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidTime`] on any unrecognized format.
    pub fn parse(units: &str) -> Result<Self, IoError> {
        let parts: Vec<&str> = units.splitn(3, ' ').collect();
        if parts.len() < 3 || parts[1] != "since" {
            return Err(IoError::InvalidTime {
                reason: format!("unexpected time units format: '{units}'"),
            });
        }
        let days_per_unit = match parts[0] {
            "days" | "day" => 1.0,
            "hours" | "hour" => 1.0 / 24.0,
            "minutes" | "minute" => 1.0 / 1_440.0,
            "seconds" | "second" => 1.0 / 86_400.0,
            other => {
                return Err(IoError::InvalidTime {
                    reason: format!("unsupported time unit '{other}'"),
                });
            }
        };

        // Only the date portion matters; any time-of-day suffix is dropped.
        let date_str = parts[2].split(' ').next().unwrap_or(parts[2]);
        let fields: Vec<&str> = date_str.split('-').collect();
        if fields.len() != 3 {
            return Err(IoError::InvalidTime {
                reason: format!("failed to parse base date '{date_str}'"),
            });
        }
        let parse_field = |s: &str| {
            s.parse::<i64>().map_err(|e| IoError::InvalidTime {
                reason: format!("failed to parse base date '{date_str}': {e}"),
            })
        };
        let base_year = parse_field(fields[0])? as i32;
        let base_month = parse_field(fields[1])? as u32;
        let base_day = parse_field(fields[2])? as u32;
        if !(1..=12).contains(&base_month) || !(1..=31).contains(&base_day) {
            return Err(IoError::InvalidTime {
                reason: format!("base date '{date_str}' out of range"),
            });
        }
        Ok(Self {
            base_year,
            base_month,
            base_day,
            days_per_unit,
        })
    }
}

/// Decode raw time offsets into month keys under the given calendar.
///
/// # Errors
///
/// Returns [`IoError::InvalidTime`] on date overflow.
pub fn decode_times(
    units: &TimeUnits,
    calendar: CfCalendar,
    offsets: &[f64],
) -> Result<Vec<MonthKey>, IoError> {
    offsets
        .iter()
        .map(|&raw| {
            let days = (raw * units.days_per_unit).floor() as i64;
            match calendar {
                CfCalendar::Standard => standard_month(units, days),
                CfCalendar::NoLeap => noleap_month(units, days),
                CfCalendar::Day360 => day360_month(units, days),
            }
        })
        .collect()
}

fn standard_month(units: &TimeUnits, days: i64) -> Result<MonthKey, IoError> {
    let base = NaiveDate::from_ymd_opt(units.base_year, units.base_month, units.base_day)
        .ok_or_else(|| IoError::InvalidTime {
            reason: format!(
                "invalid base date {:04}-{:02}-{:02}",
                units.base_year, units.base_month, units.base_day
            ),
        })?;
    let date = base
        .checked_add_signed(TimeDelta::days(days))
        .ok_or_else(|| IoError::InvalidTime {
            reason: format!("date overflow adding {days} days to {base}"),
        })?;
    Ok(MonthKey::new(date.year(), date.month())?)
}

fn noleap_month(units: &TimeUnits, days: i64) -> Result<MonthKey, IoError> {
    // Day index within the base year, then plain 365-day arithmetic.
    let base_idx: i64 = NOLEAP_MONTH_DAYS[..(units.base_month as usize - 1)]
        .iter()
        .sum::<i64>()
        + i64::from(units.base_day)
        - 1;
    let total = base_idx + days;
    let year = i64::from(units.base_year) + total.div_euclid(365);
    let mut rem = total.rem_euclid(365);
    let mut month = 1u32;
    for &len in &NOLEAP_MONTH_DAYS {
        if rem < len {
            break;
        }
        rem -= len;
        month += 1;
    }
    Ok(MonthKey::new(year as i32, month)?)
}

fn day360_month(units: &TimeUnits, days: i64) -> Result<MonthKey, IoError> {
    let base_idx =
        i64::from(units.base_month - 1) * 30 + i64::from(units.base_day.min(30)) - 1;
    let total = base_idx + days;
    let year = i64::from(units.base_year) + total.div_euclid(360);
    let month = (total.rem_euclid(360) / 30 + 1) as u32;
    Ok(MonthKey::new(year as i32, month)?)
}

/// Encode a month key as whole days since 1850-01-01 in the standard
/// calendar. Used when writing result files.
pub fn days_since_1850(key: MonthKey) -> Result<f64, IoError> {
    let base = NaiveDate::from_ymd_opt(1850, 1, 1).ok_or_else(|| IoError::InvalidTime {
        reason: "invalid epoch".to_string(),
    })?;
    let date =
        NaiveDate::from_ymd_opt(key.year(), key.month(), 1).ok_or_else(|| IoError::InvalidTime {
            reason: format!("month key {key} out of chrono range"),
        })?;
    Ok((date - base).num_days() as f64)
}
