//! Progress events published by the scheduler.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::date_range::DateRange;
use crate::error::SourceError;
use crate::placement::{NotePath, Placement};
use crate::run::SyncRun;

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Sleeping,
    Failed,
    Stopped,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Running => "running",
            SchedulerState::Sleeping => "sleeping",
            SchedulerState::Failed => "failed",
            SchedulerState::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub enum SyncProgress {
    StateChanged(SchedulerState),
    FetchStarted(DateRange),
    FetchCompleted { events: usize },
    EventPlaced { title: String, path: NotePath, placement: Placement },
    EventFailed { title: String, message: String },
    CycleCompleted(SyncRun),
    CycleFailed { message: String },
    /// Credentials need renewing; continuous runs keep going
    AuthExpired(SourceError),
    SleepingUntil(DateTime<Utc>),
}

pub type ProgressSender = mpsc::UnboundedSender<SyncProgress>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<SyncProgress>;

pub fn channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}
