//! Deterministic note paths and create-or-skip writes.
//!
//! A note's path depends only on the event title, its local start and the
//! folder layout. Notes are never overwritten: once a path exists the event
//! is skipped. Notes written under a previous layout stay where they are.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{DayflowError, DayflowResult};
use crate::event::CalendarEvent;
use crate::render;
use crate::store::NoteStore;

/// Default folder (relative to the vault root) for event notes.
pub const DEFAULT_EVENTS_FOLDER: &str = "Calendar Events";

const MAX_TITLE_CHARS: usize = 80;
const TRUNCATED_TITLE_CHARS: usize = 77;

/// Date-folder organization for event notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FolderLayout {
    /// All notes in the events folder, named `YYYY-MM-DD <title>.md`
    #[default]
    Flat,
    /// `2024/`
    Year,
    /// `2024/03/`
    YearMonth,
    /// `2024/03/15/`
    YearMonthDay,
    /// `2024/W11/` (ISO week)
    YearWeek,
}

impl FolderLayout {
    /// Date-hierarchical layouts name files by time of day instead of date.
    pub fn is_dated(&self) -> bool {
        !matches!(self, FolderLayout::Flat)
    }

    /// Folder components for a note starting on `date`.
    pub fn folder_for(&self, date: NaiveDate) -> PathBuf {
        let year = format!("{:04}", date.year());
        let month = format!("{:02}", date.month());
        let day = format!("{:02}", date.day());

        match self {
            FolderLayout::Flat => PathBuf::new(),
            FolderLayout::Year => PathBuf::from(year),
            FolderLayout::YearMonth => [year, month].iter().collect(),
            FolderLayout::YearMonthDay => [year, month, day].iter().collect(),
            FolderLayout::YearWeek => {
                // The ISO week can belong to the neighbouring year (e.g. 2024-12-30 is 2025-W01)
                let week = date.iso_week();
                [format!("{:04}", week.year()), format!("W{:02}", week.week())]
                    .iter()
                    .collect()
            }
        }
    }
}

impl FromStr for FolderLayout {
    type Err = DayflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('\\', "/");
        match normalized.trim_matches('/') {
            "" | "flat" | "none" => Ok(FolderLayout::Flat),
            "year" => Ok(FolderLayout::Year),
            "year/month" => Ok(FolderLayout::YearMonth),
            "year/month/day" => Ok(FolderLayout::YearMonthDay),
            "year/week" => Ok(FolderLayout::YearWeek),
            other => Err(DayflowError::Config(format!(
                "Unknown folder layout '{other}'. Expected one of: flat, year, year/month, year/month/day, year/week"
            ))),
        }
    }
}

impl TryFrom<String> for FolderLayout {
    type Error = DayflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FolderLayout> for String {
    fn from(layout: FolderLayout) -> Self {
        layout.to_string()
    }
}

impl fmt::Display for FolderLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FolderLayout::Flat => "flat",
            FolderLayout::Year => "year",
            FolderLayout::YearMonth => "year/month",
            FolderLayout::YearMonthDay => "year/month/day",
            FolderLayout::YearWeek => "year/week",
        };
        write!(f, "{s}")
    }
}

/// Location of an event note, relative to the vault root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotePath {
    pub folder: PathBuf,
    pub filename: String,
}

impl NotePath {
    pub fn relative(&self) -> PathBuf {
        self.folder.join(&self.filename)
    }

    /// Note name as used in `[[wiki links]]` (filename without `.md`).
    pub fn link_name(&self) -> &str {
        self.filename.strip_suffix(".md").unwrap_or(&self.filename)
    }
}

impl fmt::Display for NotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative().display())
    }
}

/// Outcome of writing one event note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Created,
    Skipped,
}

/// Maps events to note paths under an organization policy.
#[derive(Debug, Clone)]
pub struct NotePlacer {
    events_folder: PathBuf,
    layout: FolderLayout,
    tz: Tz,
}

impl NotePlacer {
    pub fn new(events_folder: impl Into<PathBuf>, layout: FolderLayout, tz: Tz) -> Self {
        NotePlacer {
            events_folder: events_folder.into(),
            layout,
            tz,
        }
    }

    pub fn timezone(&self) -> &Tz {
        &self.tz
    }

    pub fn place(&self, event: &CalendarEvent) -> NotePath {
        let local_start = event.local_start(&self.tz);
        let title = sanitize_title(event.title());

        let filename = if self.layout.is_dated() {
            // All-day notes sort ahead of everything else in the day
            let prefix = if event.is_all_day() {
                "0000".to_string()
            } else {
                local_start.format("%H%M").to_string()
            };
            format!("{prefix} - {title}.md")
        } else {
            format!("{} {title}.md", local_start.format("%Y-%m-%d"))
        };

        NotePath {
            folder: self
                .events_folder
                .join(self.layout.folder_for(local_start.date_naive())),
            filename,
        }
    }

    /// Write `content` unless a note already exists at `path`.
    pub fn write_if_absent<S: NoteStore>(
        &self,
        path: &NotePath,
        content: &str,
        store: &S,
    ) -> DayflowResult<Placement> {
        let relative = path.relative();
        if store.exists(&relative) {
            return Ok(Placement::Skipped);
        }

        store
            .write(&relative, content)
            .map_err(|source| DayflowError::NoteWriteFailed {
                path: relative,
                source,
            })?;
        Ok(Placement::Created)
    }

    /// Place, render and write one event. Rendering is skipped for existing notes.
    pub fn sync_event<S: NoteStore>(
        &self,
        event: &CalendarEvent,
        store: &S,
    ) -> DayflowResult<(NotePath, Placement)> {
        let path = self.place(event);
        if store.exists(&path.relative()) {
            return Ok((path, Placement::Skipped));
        }

        let content = render::event_note(event, &self.tz);
        let placement = self.write_if_absent(&path, &content, store)?;
        Ok((path, placement))
    }
}

/// Make a title safe to use as a filename.
pub fn sanitize_title(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '-',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        return "Untitled".to_string();
    }

    if trimmed.chars().count() > MAX_TITLE_CHARS {
        let cut: String = trimmed.chars().take(TRUNCATED_TITLE_CHARS).collect();
        format!("{}...", cut.trim_end())
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryNoteStore;
    use chrono::{TimeZone, Utc};

    fn standup() -> CalendarEvent {
        CalendarEvent::new(
            "a",
            "Morning Standup",
            Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn placer(layout: FolderLayout) -> NotePlacer {
        NotePlacer::new(DEFAULT_EVENTS_FOLDER, layout, chrono_tz::UTC)
    }

    #[test]
    fn test_flat_layout_uses_date_prefix() {
        let path = placer(FolderLayout::Flat).place(&standup());
        assert_eq!(path.folder, PathBuf::from("Calendar Events"));
        assert_eq!(path.filename, "2024-03-15 Morning Standup.md");
        assert_eq!(path.link_name(), "2024-03-15 Morning Standup");
    }

    #[test]
    fn test_dated_layouts() {
        let event = standup();
        let cases = [
            (FolderLayout::Year, "Calendar Events/2024"),
            (FolderLayout::YearMonth, "Calendar Events/2024/03"),
            (FolderLayout::YearMonthDay, "Calendar Events/2024/03/15"),
            (FolderLayout::YearWeek, "Calendar Events/2024/W11"),
        ];

        for (layout, folder) in cases {
            let path = placer(layout).place(&event);
            assert_eq!(path.folder, PathBuf::from(folder), "layout {layout}");
            assert_eq!(path.filename, "0930 - Morning Standup.md");
        }
    }

    #[test]
    fn test_iso_week_uses_week_year() {
        let event = CalendarEvent::new(
            "ny",
            "Planning",
            Utc.with_ymd_and_hms(2024, 12, 30, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 12, 30, 11, 0, 0).unwrap(),
        )
        .unwrap();
        let path = placer(FolderLayout::YearWeek).place(&event);
        assert_eq!(path.folder, PathBuf::from("Calendar Events/2025/W01"));
    }

    #[test]
    fn test_all_day_sorts_first() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let holiday =
            CalendarEvent::all_day("h", "Company Holiday", day, day.succ_opt().unwrap(), &chrono_tz::UTC)
                .unwrap();
        let placer = placer(FolderLayout::YearMonthDay);

        let holiday_name = placer.place(&holiday).filename;
        let standup_name = placer.place(&standup()).filename;
        assert_eq!(holiday_name, "0000 - Company Holiday.md");
        assert!(holiday_name < standup_name);
    }

    #[test]
    fn test_prefix_uses_local_time() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let placer = NotePlacer::new("Meetings", FolderLayout::YearMonthDay, tz);
        // 01:30 UTC on the 16th is 21:30 on the 15th in New York (EDT)
        let event = CalendarEvent::new(
            "late",
            "Late Call",
            Utc.with_ymd_and_hms(2024, 3, 16, 1, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 16, 2, 0, 0).unwrap(),
        )
        .unwrap();

        let path = placer.place(&event);
        assert_eq!(path.relative(), PathBuf::from("Meetings/2024/03/15/2130 - Late Call.md"));
    }

    #[test]
    fn test_same_policy_same_path() {
        let placer = placer(FolderLayout::YearMonth);
        assert_eq!(placer.place(&standup()), placer.place(&standup()));
    }

    #[test]
    fn test_policy_change_does_not_touch_old_note() {
        let store = MemoryNoteStore::new();
        let event = standup();

        let (flat_path, first) = placer(FolderLayout::Flat).sync_event(&event, &store).unwrap();
        let (dated_path, second) =
            placer(FolderLayout::YearMonthDay).sync_event(&event, &store).unwrap();

        assert_eq!(first, Placement::Created);
        assert_eq!(second, Placement::Created);
        assert_ne!(flat_path, dated_path);
        assert!(store.exists(&flat_path.relative()));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_write_if_absent_never_overwrites() {
        let store = MemoryNoteStore::new();
        let placer = placer(FolderLayout::Flat);
        let path = placer.place(&standup());

        assert_eq!(placer.write_if_absent(&path, "original", &store).unwrap(), Placement::Created);
        assert_eq!(placer.write_if_absent(&path, "changed", &store).unwrap(), Placement::Skipped);
        assert_eq!(store.get(&path.relative()).as_deref(), Some("original"));
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Q4: Review/Plan?"), "Q4- Review-Plan-");
        assert_eq!(sanitize_title("  ..Hidden.. "), "Hidden");
        assert_eq!(sanitize_title("   "), "Untitled");

        let long = "x".repeat(100);
        let sanitized = sanitize_title(&long);
        assert_eq!(sanitized.chars().count(), 80);
        assert!(sanitized.ends_with("..."));
    }

    #[test]
    fn test_layout_parsing() {
        assert_eq!("Year/Month/Day".parse::<FolderLayout>().unwrap(), FolderLayout::YearMonthDay);
        assert_eq!("year\\week".parse::<FolderLayout>().unwrap(), FolderLayout::YearWeek);
        assert_eq!("".parse::<FolderLayout>().unwrap(), FolderLayout::Flat);
        assert!("month/year".parse::<FolderLayout>().is_err());
    }
}
