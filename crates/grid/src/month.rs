//! Monthly time keys.
//!
//! Models and observations report mid-month or end-month timestamps
//! inconsistently, so the canonical time axis drops day and sub-day
//! components entirely and keys every sample by (year, month).

use std::fmt;

use crate::error::GridError;

/// A calendar month: the canonical time key for all standardized datasets.
///
/// Ordering is chronological. The key corresponds to the first day of the
/// month; day-of-month information from source files is discarded on
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// Create a new month key.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidMonth`] if `month` is outside 1..=12.
    pub fn new(year: i32, month: u32) -> Result<Self, GridError> {
        if !(1..=12).contains(&month) {
            return Err(GridError::InvalidMonth { month });
        }
        Ok(Self { year, month })
    }

    /// January of `year`.
    pub fn first(year: i32) -> Self {
        Self { year, month: 1 }
    }

    /// December of `year`.
    pub fn last(year: i32) -> Self {
        Self { year, month: 12 }
    }

    /// Year component.
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Month component (1..=12).
    pub fn month(&self) -> u32 {
        self.month
    }

    /// The month immediately after this one.
    pub fn next(&self) -> MonthKey {
        if self.month == 12 {
            MonthKey {
                year: self.year + 1,
                month: 1,
            }
        } else {
            MonthKey {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// The month immediately before this one.
    pub fn prev(&self) -> MonthKey {
        if self.month == 1 {
            MonthKey {
                year: self.year - 1,
                month: 12,
            }
        } else {
            MonthKey {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Signed number of months from `other` to `self`.
    pub fn months_since(&self, other: &MonthKey) -> i64 {
        (i64::from(self.year) - i64::from(other.year)) * 12
            + (i64::from(self.month) - i64::from(other.month))
    }

    /// Inclusive sequence of consecutive months from `start` to `end`.
    ///
    /// Empty when `end` precedes `start`.
    pub fn sequence(start: MonthKey, end: MonthKey) -> Vec<MonthKey> {
        let mut out = Vec::new();
        let mut cur = start;
        while cur <= end {
            out.push(cur);
            cur = cur.next();
        }
        out
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Check that a time axis is strictly increasing with no duplicate months.
pub fn is_strictly_increasing(times: &[MonthKey]) -> bool {
    times.windows(2).all(|w| w[0] < w[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_and_accessors() {
        let m = MonthKey::new(2005, 1).unwrap();
        assert_eq!(m.year(), 2005);
        assert_eq!(m.month(), 1);
    }

    #[test]
    fn year_endpoints() {
        assert_eq!(MonthKey::first(2005), MonthKey::new(2005, 1).unwrap());
        assert_eq!(MonthKey::last(2005), MonthKey::new(2005, 12).unwrap());
    }

    #[test]
    fn rejects_invalid_month() {
        assert!(MonthKey::new(2005, 0).is_err());
        assert!(MonthKey::new(2005, 13).is_err());
    }

    #[test]
    fn ordering_is_chronological() {
        let a = MonthKey::new(2014, 12).unwrap();
        let b = MonthKey::new(2015, 1).unwrap();
        assert!(a < b);
        assert_eq!(a.next(), b);
        assert_eq!(b.prev(), a);
    }

    #[test]
    fn year_rollover() {
        let dec = MonthKey::new(1999, 12).unwrap();
        assert_eq!(dec.next(), MonthKey::new(2000, 1).unwrap());
        let jan = MonthKey::new(2000, 1).unwrap();
        assert_eq!(jan.prev(), dec);
    }

    #[test]
    fn months_since() {
        let a = MonthKey::new(2005, 1).unwrap();
        let b = MonthKey::new(2014, 12).unwrap();
        assert_eq!(b.months_since(&a), 119);
        assert_eq!(a.months_since(&b), -119);
        assert_eq!(a.months_since(&a), 0);
    }

    #[test]
    fn sequence_inclusive() {
        let start = MonthKey::new(2014, 11).unwrap();
        let end = MonthKey::new(2015, 2).unwrap();
        let seq = MonthKey::sequence(start, end);
        assert_eq!(seq.len(), 4);
        assert_eq!(seq[0], start);
        assert_eq!(seq[3], end);
    }

    #[test]
    fn sequence_empty_when_reversed() {
        let start = MonthKey::new(2015, 2).unwrap();
        let end = MonthKey::new(2014, 11).unwrap();
        assert!(MonthKey::sequence(start, end).is_empty());
    }

    #[test]
    fn strictly_increasing_check() {
        let a = MonthKey::new(2000, 1).unwrap();
        let b = MonthKey::new(2000, 2).unwrap();
        assert!(is_strictly_increasing(&[a, b]));
        assert!(!is_strictly_increasing(&[b, a]));
        assert!(!is_strictly_increasing(&[a, a]));
        assert!(is_strictly_increasing(&[]));
    }

    #[test]
    fn display_format() {
        let m = MonthKey::new(5, 3).unwrap();
        assert_eq!(m.to_string(), "0005-03");
    }
}
