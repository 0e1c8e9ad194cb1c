//! Time-window classification of events against a reference instant.
//!
//! Events are treated as half-open intervals `[start, end)`: an event whose
//! end equals `now` has already finished.

use chrono::{DateTime, Duration, Utc};

use crate::event::CalendarEvent;

/// How far ahead an event still counts as upcoming.
pub const DEFAULT_UPCOMING_WINDOW_MINUTES: i64 = 5;
/// How long after its end an event still counts as recently ended.
pub const DEFAULT_RECENT_WINDOW_MINUTES: i64 = 30;

/// Where an event sits relative to `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeetingClassification {
    Past,
    Current,
    Upcoming,
    Future,
}

/// The events selected for a reference instant.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Classified<'a> {
    pub current: Option<&'a CalendarEvent>,
    pub upcoming: Option<&'a CalendarEvent>,
    pub recently_ended: Option<&'a CalendarEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeetingMatcher {
    upcoming_window: Duration,
    recent_window: Duration,
}

impl Default for MeetingMatcher {
    fn default() -> Self {
        MeetingMatcher {
            upcoming_window: Duration::minutes(DEFAULT_UPCOMING_WINDOW_MINUTES),
            recent_window: Duration::minutes(DEFAULT_RECENT_WINDOW_MINUTES),
        }
    }
}

impl MeetingMatcher {
    pub fn new(upcoming_window: Duration, recent_window: Duration) -> Self {
        MeetingMatcher {
            upcoming_window,
            recent_window,
        }
    }

    pub fn upcoming_window(&self) -> Duration {
        self.upcoming_window
    }

    pub fn recent_window(&self) -> Duration {
        self.recent_window
    }

    /// Classify a single event. `None` means it ended longer ago than the
    /// recent window and is out of consideration.
    pub fn classify_event(
        &self,
        event: &CalendarEvent,
        now: DateTime<Utc>,
    ) -> Option<MeetingClassification> {
        if event.start() <= now && now < event.end() {
            Some(MeetingClassification::Current)
        } else if now < event.start() {
            if event.start() - now <= self.upcoming_window {
                Some(MeetingClassification::Upcoming)
            } else {
                Some(MeetingClassification::Future)
            }
        } else if now - event.end() <= self.recent_window {
            Some(MeetingClassification::Past)
        } else {
            None
        }
    }

    /// Pick the current, next upcoming and most recently ended events.
    ///
    /// Overlapping current events resolve to a timed event over an all-day
    /// one, then to the earliest start, then to input order.
    pub fn classify<'a>(&self, events: &'a [CalendarEvent], now: DateTime<Utc>) -> Classified<'a> {
        let in_bucket = move |bucket: MeetingClassification| {
            events
                .iter()
                .filter(move |e| self.classify_event(e, now) == Some(bucket))
        };

        // min_by_key keeps the first of equal keys, so input order breaks ties
        Classified {
            current: in_bucket(MeetingClassification::Current)
                .min_by_key(|e| (e.is_all_day(), e.start())),
            upcoming: in_bucket(MeetingClassification::Upcoming).min_by_key(|e| e.start() - now),
            recently_ended: in_bucket(MeetingClassification::Past).min_by_key(|e| now - e.end()),
        }
    }
}
