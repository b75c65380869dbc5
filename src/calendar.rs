//! Naive local calendar helpers
//!
//! Month arithmetic, half-hour bucket alignment and the offset-anchored
//! reference date. Everything here works on naive local time; DST is not
//! taken into account.

use crate::error::{LinkydError, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Width of the finest reading bucket in minutes
pub const BUCKET_MINUTES: u32 = 30;

/// A calendar month, used as the key of monthly readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Build from a year and a 1-based month
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(LinkydError::validation(
                "month",
                format!("Month out of range: {}", month),
            ));
        }
        Ok(Self { year, month })
    }

    /// Month containing a date
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub const fn year(self) -> i32 {
        self.year
    }

    pub const fn month(self) -> u32 {
        self.month
    }

    /// Shift by a signed number of months
    pub const fn add_months(self, months: i32) -> Self {
        let index = self.year * 12 + self.month as i32 - 1 + months;
        Self {
            year: index.div_euclid(12),
            month: (index.rem_euclid(12) + 1) as u32,
        }
    }

    /// Same month one year earlier
    pub const fn previous_year(self) -> Self {
        self.add_months(-12)
    }

    pub const fn is_leap_year(self) -> bool {
        (self.year % 4 == 0 && self.year % 100 != 0) || self.year % 400 == 0
    }

    pub const fn days_in_month(self) -> u32 {
        match self.month {
            2 if self.is_leap_year() => 29,
            2 => 28,
            4 | 6 | 9 | 11 => 30,
            _ => 31,
        }
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, self.days_in_month())
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        Self::of(date) == self
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = LinkydError;

    /// Accepts `YYYY-MM` and anything longer that starts with it, such as the
    /// `endTs` timestamps of monthly summaries.
    fn from_str(s: &str) -> Result<Self> {
        let head = s.get(0..7).ok_or_else(|| {
            LinkydError::validation("year_month", format!("Too short: {}", s))
        })?;
        let (year, month) = head.split_once('-').ok_or_else(|| {
            LinkydError::validation("year_month", format!("Expected YYYY-MM: {}", s))
        })?;
        let year = year
            .parse::<i32>()
            .map_err(|e| LinkydError::validation("year_month", e.to_string()))?;
        let month = month
            .parse::<u32>()
            .map_err(|e| LinkydError::validation("year_month", e.to_string()))?;
        Self::new(year, month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// `today - day_offset`, keeping the wall-clock time of day
pub fn reference_datetime(now: NaiveDateTime, day_offset: u32) -> NaiveDateTime {
    now - Duration::days(i64::from(day_offset))
}

/// Round down to the most recently started 30-minute bucket.
///
/// Minutes 0-29 map to `:00` and 30-59 to `:30`; seconds are dropped.
pub fn floor_to_bucket(ts: NaiveDateTime) -> NaiveDateTime {
    let minute = ts.minute() - ts.minute() % BUCKET_MINUTES;
    let time = NaiveTime::from_hms_opt(ts.hour(), minute, 0).unwrap_or(NaiveTime::MIN);
    ts.date().and_time(time)
}

/// Midnight at the start of a date
pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Every bucket start in `[from, through]`, both already aligned
pub fn buckets_between(
    from: NaiveDateTime,
    through: NaiveDateTime,
) -> impl Iterator<Item = NaiveDateTime> {
    let step = Duration::minutes(i64::from(BUCKET_MINUTES));
    std::iter::successors(Some(from), move |ts| Some(*ts + step))
        .take_while(move |ts| *ts <= through)
}

/// Map a date outside `month` onto its first or last day
pub fn clamp_to_month(date: NaiveDate, month: YearMonth) -> NaiveDate {
    if date < month.first_day() {
        month.first_day()
    } else if date > month.last_day() {
        month.last_day()
    } else {
        date
    }
}
