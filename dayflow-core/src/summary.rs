//! Daily summary notes.
//!
//! One note per local date that has meetings, listing them with links to
//! their event notes. Unlike event notes, summaries are regenerated on every
//! cycle so the schedule and the current-meeting marker stay fresh.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::error::{DayflowError, DayflowResult};
use crate::event::CalendarEvent;
use crate::placement::NotePlacer;
use crate::render;
use crate::store::NoteStore;

pub const DEFAULT_SUMMARY_FOLDER: &str = "Daily Notes";

#[derive(Debug, Clone)]
pub struct DailySummaryWriter {
    folder: PathBuf,
    placer: NotePlacer,
}

impl DailySummaryWriter {
    pub fn new(folder: impl Into<PathBuf>, placer: NotePlacer) -> Self {
        DailySummaryWriter {
            folder: folder.into(),
            placer,
        }
    }

    /// `<folder>/2024-03-15 Daily Summary.md`
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.folder
            .join(format!("{} Daily Summary.md", date.format("%Y-%m-%d")))
    }

    /// Events grouped by local start date, each day sorted by start.
    pub fn group_by_day<'a>(
        &self,
        events: &'a [CalendarEvent],
    ) -> BTreeMap<NaiveDate, Vec<&'a CalendarEvent>> {
        let tz = self.placer.timezone();
        let mut days: BTreeMap<NaiveDate, Vec<&CalendarEvent>> = BTreeMap::new();
        for event in events {
            days.entry(event.local_start(tz).date_naive())
                .or_default()
                .push(event);
        }
        for day in days.values_mut() {
            day.sort_by_key(|e| e.start());
        }
        days
    }

    /// Render and write the summary for one day, replacing any previous one.
    /// `current` is highlighted when it is among `events`.
    pub fn write_day<S: NoteStore>(
        &self,
        date: NaiveDate,
        events: &[&CalendarEvent],
        current: Option<&CalendarEvent>,
        store: &S,
    ) -> DayflowResult<PathBuf> {
        let entries: Vec<render::SummaryEntry> = events
            .iter()
            .map(|&event| render::SummaryEntry {
                event,
                link: self.placer.place(event).link_name().to_string(),
                is_current: current.is_some_and(|c| c.id() == event.id()),
            })
            .collect();

        let content = render::daily_summary(date, &entries, self.placer.timezone());
        let path = self.path_for(date);
        store
            .write(&path, &content)
            .map_err(|source| DayflowError::NoteWriteFailed {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}
