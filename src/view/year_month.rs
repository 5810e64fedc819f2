use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::memo::zoned_from_local;

pub const MIN_YEAR: i32 = 1;

/// A calendar month. Always valid: year at least 1, month in `1..=12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawYearMonth", into = "RawYearMonth")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

#[derive(Serialize, Deserialize)]
struct RawYearMonth {
    year: i32,
    month: u32,
}

impl TryFrom<RawYearMonth> for YearMonth {
    type Error = Error;

    fn try_from(raw: RawYearMonth) -> Result<Self> {
        YearMonth::new(raw.year, raw.month)
    }
}

impl From<YearMonth> for RawYearMonth {
    fn from(ym: YearMonth) -> Self {
        RawYearMonth {
            year: ym.year,
            month: ym.month,
        }
    }
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if year < MIN_YEAR || !(1..=12).contains(&month) {
            return Err(Error::InvalidYearMonth { year, month });
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn is_before(&self, other: &YearMonth) -> bool {
        self < other
    }

    pub fn is_after(&self, other: &YearMonth) -> bool {
        self > other
    }

    pub fn is_same(&self, other: &YearMonth) -> bool {
        self == other
    }

    /// Saturates only at year `i32::MAX`.
    pub fn next_month(&self) -> YearMonth {
        match (self.year, self.month) {
            (i32::MAX, 12) => *self,
            (year, 12) => YearMonth { year: year + 1, month: 1 },
            (year, month) => YearMonth { year, month: month + 1 },
        }
    }

    /// Saturates at 0001-01.
    pub fn previous_month(&self) -> YearMonth {
        match (self.year, self.month) {
            (MIN_YEAR, 1) => *self,
            (year, 1) => YearMonth { year: year - 1, month: 12 },
            (year, month) => YearMonth { year, month: month - 1 },
        }
    }

    /// Epoch millis of the first instant of this month in `tz`.
    pub fn start_timestamp<Tz: TimeZone>(&self, tz: &Tz) -> i64 {
        month_start_millis(self.year, self.month, tz)
    }

    /// Epoch millis of the first instant of the following month (exclusive bound).
    pub fn end_timestamp<Tz: TimeZone>(&self, tz: &Tz) -> i64 {
        if self.month == 12 {
            month_start_millis(self.year.saturating_add(1), 1, tz)
        } else {
            month_start_millis(self.year, self.month + 1, tz)
        }
    }

    pub fn from_timestamp<Tz: TimeZone>(millis: i64, tz: &Tz) -> Result<Self> {
        let utc = DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or_else(|| Error::Other(format!("timestamp out of range: {}", millis)))?;
        let local = utc.with_timezone(tz);
        YearMonth::new(local.year(), local.month())
    }

    pub fn current<Tz: TimeZone>(tz: &Tz) -> Result<Self> {
        YearMonth::from_timestamp(Utc::now().timestamp_millis(), tz)
    }
}

/// Months past chrono's last representable date start at `i64::MAX`.
fn month_start_millis<Tz: TimeZone>(year: i32, month: u32, tz: &Tz) -> i64 {
    let Some(naive) = NaiveDate::from_ymd_opt(year, month, 1).and_then(|date| date.and_hms_opt(0, 0, 0)) else {
        return i64::MAX;
    };
    match zoned_from_local(&naive, tz) {
        Some(time) => time.timestamp_millis(),
        None => naive.and_utc().timestamp_millis(),
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}
