//! Sync engine for dayflow.
//!
//! Pulls events from a calendar source and keeps a note vault in step with
//! them:
//! - `matcher` decides which event is current, upcoming or recently ended
//! - `placement` maps events to note paths and writes each note once
//! - `tracker` keeps the "Current Meeting" pointer file up to date
//! - `summary` rewrites one overview note per day
//! - `status` persists sync counts and the last error between runs
//! - `scheduler` drives one-shot and continuous syncs

pub mod clock;
pub mod config;
pub mod date_range;
pub mod error;
pub mod event;
pub mod matcher;
pub mod placement;
pub mod progress;
pub mod render;
pub mod run;
pub mod scheduler;
pub mod source;
pub mod status;
pub mod store;
pub mod summary;
pub mod tracker;

pub use config::DayflowConfig;
pub use date_range::DateRange;
pub use error::{DayflowError, DayflowResult, SourceError};
pub use event::CalendarEvent;
pub use matcher::{Classified, MeetingClassification, MeetingMatcher};
pub use placement::{FolderLayout, NotePath, NotePlacer, Placement};
pub use progress::{SchedulerState, SyncProgress};
pub use run::{EventError, SyncRun};
pub use scheduler::{ContinuousSummary, FetchWindow, SchedulerConfig, SyncScheduler};
pub use source::{AnySource, EventSource};
pub use status::{SyncMode, SyncStatus, SyncStatusStore};
pub use store::{FsNoteStore, MemoryNoteStore, NoteStore};
pub use summary::DailySummaryWriter;
pub use tracker::CurrentMeetingTracker;
