//! Accounting periods, date ranges and time buckets.
//!
//! A [`Period`] is a calendar month in UTC. All ranges are half-open:
//! `[start, end)`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MeterError, Result};

/// A calendar-month accounting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    /// Create a period, validating the month.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::InvalidPeriod` if `month` is not in `1..=12`.
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(MeterError::InvalidPeriod(format!("{year}-{month}")));
        }
        Ok(Self { year, month })
    }

    /// The period containing `ts`.
    #[must_use]
    pub fn containing(ts: DateTime<Utc>) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
        }
    }

    /// Calendar year.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Calendar month (1-12).
    #[must_use]
    pub const fn month(&self) -> u32 {
        self.month
    }

    /// First instant of the period.
    #[must_use]
    pub fn start(&self) -> DateTime<Utc> {
        month_start(self.year, self.month)
    }

    /// First instant after the period.
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.next().start()
    }

    /// The following month.
    #[must_use]
    pub const fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// The preceding month.
    #[must_use]
    pub const fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Whether `ts` falls inside the period.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        Self::containing(ts) == *self
    }

    /// A period is closed once its end has passed; only closed periods are
    /// safe for exact, repeatable reporting.
    #[must_use]
    pub fn is_closed(&self, now: DateTime<Utc>) -> bool {
        now >= self.end()
    }

    /// The period as a date range.
    #[must_use]
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start(),
            end: self.end(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = MeterError;

    fn from_str(s: &str) -> Result<Self> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| MeterError::InvalidPeriod(s.to_string()))?;
        let year = year
            .parse()
            .map_err(|_| MeterError::InvalidPeriod(s.to_string()))?;
        let month = month
            .parse()
            .map_err(|_| MeterError::InvalidPeriod(s.to_string()))?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for Period {
    type Error = MeterError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

/// A half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Create a range, rejecting empty or inverted bounds.
    ///
    /// # Errors
    ///
    /// Returns `MeterError::InvalidDateRange` if `end <= start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(MeterError::InvalidDateRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// The trailing window of length `window` ending at `now`.
    #[must_use]
    pub fn trailing(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            start: now - window,
            end: now,
        }
    }

    /// Whether `ts` falls inside the range.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Granularity of a cost breakdown series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    /// One bucket per UTC day.
    Day,
    /// One bucket per ISO week (Monday start).
    Week,
    /// One bucket per calendar month.
    Month,
}

impl TimeBucket {
    /// Start of the bucket containing `ts`.
    #[must_use]
    pub fn bucket_start(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let day = day_start(ts.date_naive());
        match self {
            Self::Day => day,
            Self::Week => {
                let back = i64::from(ts.weekday().num_days_from_monday());
                day - Duration::days(back)
            }
            Self::Month => month_start(ts.year(), ts.month()),
        }
    }

    /// Start of the bucket following the one starting at `bucket_start`.
    #[must_use]
    pub fn next_start(self, bucket_start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Day => bucket_start + Duration::days(1),
            Self::Week => bucket_start + Duration::weeks(1),
            Self::Month => Period::containing(bucket_start).end(),
        }
    }
}

impl FromStr for TimeBucket {
    type Err = MeterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => Err(MeterError::InvalidGrouping(other.to_string())),
        }
    }
}

fn month_start(year: i32, month: u32) -> DateTime<Utc> {
    // Month is validated on construction; day 1 always exists.
    NaiveDate::from_ymd_opt(year, month, 1)
        .map_or(DateTime::<Utc>::MIN_UTC, day_start)
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn period_bounds() {
        let p = Period::new(2026, 12).unwrap();
        assert_eq!(p.start(), ts("2026-12-01T00:00:00Z"));
        assert_eq!(p.end(), ts("2027-01-01T00:00:00Z"));
        assert_eq!(p.next(), Period::new(2027, 1).unwrap());
        assert_eq!(Period::new(2027, 1).unwrap().previous(), p);
    }

    #[test]
    fn period_parse_and_display() {
        let p: Period = "2026-03".parse().unwrap();
        assert_eq!(p.to_string(), "2026-03");
        assert!("2026-13".parse::<Period>().is_err());
        assert!("march".parse::<Period>().is_err());
    }

    #[test]
    fn period_is_closed_only_after_end() {
        let p = Period::new(2026, 9).unwrap();
        assert!(!p.is_closed(ts("2026-09-30T23:59:59Z")));
        assert!(p.is_closed(ts("2026-10-01T00:00:00Z")));
    }

    #[test]
    fn week_buckets_start_on_monday() {
        // 2026-10-16 is a Friday.
        let start = TimeBucket::Week.bucket_start(ts("2026-10-16T13:00:00Z"));
        assert_eq!(start, ts("2026-10-12T00:00:00Z"));
        assert_eq!(TimeBucket::Week.next_start(start), ts("2026-10-19T00:00:00Z"));
    }

    #[test]
    fn month_bucket_steps_across_year_end() {
        let start = TimeBucket::Month.bucket_start(ts("2026-12-31T23:00:00Z"));
        assert_eq!(start, ts("2026-12-01T00:00:00Z"));
        assert_eq!(TimeBucket::Month.next_start(start), ts("2027-01-01T00:00:00Z"));
    }

    #[test]
    fn date_range_rejects_inverted_bounds() {
        let a = ts("2026-01-02T00:00:00Z");
        let b = ts("2026-01-01T00:00:00Z");
        assert!(DateRange::new(a, b).is_err());
        assert!(DateRange::new(a, a).is_err());
        assert!(DateRange::new(b, a).unwrap().contains(b));
    }

    #[test]
    fn grouping_parse_rejects_unknown() {
        assert_eq!("Week".parse::<TimeBucket>().unwrap(), TimeBucket::Week);
        assert!("hour".parse::<TimeBucket>().is_err());
    }
}
