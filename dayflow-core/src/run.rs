//! Result of a single sync cycle.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// A per-event failure. These never abort the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventError {
    pub event_id: String,
    pub title: String,
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.title, self.event_id, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRun {
    pub events_fetched: usize,
    pub events_written: usize,
    pub events_skipped: usize,
    /// Daily summary notes rewritten this cycle
    pub summaries_written: usize,
    pub errors: Vec<EventError>,
    /// Title of the active meeting at the end of the cycle
    pub current: Option<String>,
    /// Cancelled between events; the remaining events were not placed
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncRun {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        SyncRun {
            events_fetched: 0,
            events_written: 0,
            events_skipped: 0,
            summaries_written: 0,
            errors: Vec::new(),
            current: None,
            interrupted: false,
            started_at,
            finished_at: started_at,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn duration(&self) -> Duration {
        self.finished_at - self.started_at
    }
}
