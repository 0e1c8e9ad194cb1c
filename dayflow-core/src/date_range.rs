//! Date range for fetching events.

use chrono::{DateTime, Days, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::event::local_midnight;

/// Days before today fetched by a one-shot sync without explicit dates.
pub const DEFAULT_DAYS_BACK: i64 = 1;
/// Days after today fetched by a one-shot sync without explicit dates.
pub const DEFAULT_DAYS_AHEAD: i64 = 7;
/// Upper bound for either side of a rolling window.
pub const MAX_WINDOW_DAYS: u32 = 366;

/// Inclusive range of local calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, String> {
        if end < start {
            return Err(format!("End date {end} is before start date {start}"));
        }
        Ok(DateRange { start, end })
    }

    /// Parse optional YYYY-MM-DD arguments.
    /// - `start` defaults to yesterday
    /// - `end` defaults to a week from today
    pub fn from_args(start: Option<&str>, end: Option<&str>, today: NaiveDate) -> Result<Self, String> {
        let start = match start {
            Some(s) => parse_date(s)?,
            None => today - Duration::days(DEFAULT_DAYS_BACK),
        };
        let end = match end {
            Some(s) => parse_date(s)?,
            None => today + Duration::days(DEFAULT_DAYS_AHEAD),
        };
        Self::new(start, end)
    }

    /// Window around `now`, in local dates. Each side is capped at
    /// [`MAX_WINDOW_DAYS`].
    pub fn around(now: DateTime<Utc>, tz: &Tz, days_back: u32, days_ahead: u32) -> Self {
        let today = now.with_timezone(tz).date_naive();
        let back = Days::new(u64::from(days_back.min(MAX_WINDOW_DAYS)));
        let ahead = Days::new(u64::from(days_ahead.min(MAX_WINDOW_DAYS)));
        DateRange {
            start: today.checked_sub_days(back).unwrap_or(today),
            end: today.checked_add_days(ahead).unwrap_or(today),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// First instant of the range (local midnight of `start`).
    pub fn start_instant(&self, tz: &Tz) -> DateTime<Utc> {
        local_midnight(self.start, tz)
    }

    /// Exclusive upper bound (local midnight after `end`).
    pub fn end_instant(&self, tz: &Tz) -> DateTime<Utc> {
        local_midnight(self.end.succ_opt().unwrap_or(self.end), tz)
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date format '{}'. Expected YYYY-MM-DD", s))
}
