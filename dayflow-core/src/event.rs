//! Calendar events as fetched from a source.
//!
//! Events are immutable values. Construction enforces `end > start`, so a
//! zero-length or inverted event never reaches the matcher or the placer.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{DayflowError, DayflowResult};

/// A calendar event (source-neutral)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EventRecord", into = "EventRecord")]
pub struct CalendarEvent {
    id: String,
    title: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    is_all_day: bool,
    location: Option<String>,
    attendees: Vec<String>,
    body: String,
    cancelled: bool,
}

/// Wire shape of an event in the provider protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventRecord {
    id: String,
    #[serde(default)]
    title: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    #[serde(default)]
    is_all_day: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(default)]
    attendees: Vec<String>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    cancelled: bool,
}

impl TryFrom<EventRecord> for CalendarEvent {
    type Error = DayflowError;

    fn try_from(record: EventRecord) -> DayflowResult<Self> {
        let mut event = CalendarEvent::new(record.id, record.title, record.start, record.end)?;
        event.is_all_day = record.is_all_day;
        event.location = record.location.filter(|l| !l.trim().is_empty());
        event.attendees = record.attendees;
        event.body = record.body;
        event.cancelled = record.cancelled;
        Ok(event)
    }
}

impl From<CalendarEvent> for EventRecord {
    fn from(event: CalendarEvent) -> Self {
        EventRecord {
            id: event.id,
            title: event.title,
            start: event.start,
            end: event.end,
            is_all_day: event.is_all_day,
            location: event.location,
            attendees: event.attendees,
            body: event.body,
            cancelled: event.cancelled,
        }
    }
}

impl CalendarEvent {
    /// Create a timed event. Fails unless `end > start`.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DayflowResult<Self> {
        let id = id.into();
        if end <= start {
            return Err(DayflowError::InvalidEvent {
                reason: format!("end ({end}) must be after start ({start})"),
                id,
            });
        }

        Ok(CalendarEvent {
            id,
            title: title.into(),
            start,
            end,
            is_all_day: false,
            location: None,
            attendees: Vec::new(),
            body: String::new(),
            cancelled: false,
        })
    }

    /// Create an all-day event covering `first_day` up to (not including)
    /// `end_day`, anchored at local midnight in `tz`.
    pub fn all_day(
        id: impl Into<String>,
        title: impl Into<String>,
        first_day: NaiveDate,
        end_day: NaiveDate,
        tz: &Tz,
    ) -> DayflowResult<Self> {
        let mut event = Self::new(id, title, local_midnight(first_day, tz), local_midnight(end_day, tz))?;
        event.is_all_day = true;
        Ok(event)
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        let location = location.into();
        self.location = (!location.trim().is_empty()).then_some(location);
        self
    }

    pub fn with_attendees(mut self, attendees: Vec<String>) -> Self {
        self.attendees = attendees;
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn mark_cancelled(mut self) -> Self {
        self.cancelled = true;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn is_all_day(&self) -> bool {
        self.is_all_day
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn attendees(&self) -> &[String] {
        &self.attendees
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Start time in the user's timezone.
    pub fn local_start(&self, tz: &Tz) -> DateTime<Tz> {
        self.start.with_timezone(tz)
    }

    /// Whether the event overlaps the half-open interval `[from, to)`.
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.start < to && self.end > from
    }
}

impl std::fmt::Display for CalendarEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.title.is_empty() {
            write!(f, "(No title)")
        } else {
            write!(f, "{}", self.title)
        }
    }
}

/// Resolve a wall-clock time in `tz` to an instant.
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times that do
/// not exist (DST spring-forward) are read as UTC.
pub fn resolve_local(naive: NaiveDateTime, tz: &Tz) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

/// Local midnight at the start of `date` in `tz`.
pub fn local_midnight(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    resolve_local(date.and_time(chrono::NaiveTime::MIN), tz)
}
