//! The sync control loop.
//!
//! One cycle: load status, fetch, classify, place notes, rewrite the daily
//! summaries, update the pointer, save status. `run_once` performs a single cycle; `run_continuous` repeats
//! it every `interval` until the cancellation token fires.
//!
//! ```text
//! Idle -> Running -> Stopped                       (one-shot)
//! Idle -> Running -> Sleeping -> Running -> ...    (continuous)
//!         Running -> Failed -> Sleeping | Stopped
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::DayflowConfig;
use crate::date_range::DateRange;
use crate::error::{DayflowError, DayflowResult, SourceError};
use crate::event::CalendarEvent;
use crate::matcher::MeetingMatcher;
use crate::placement::{FolderLayout, NotePlacer, Placement};
use crate::progress::{ProgressSender, SchedulerState, SyncProgress};
use crate::run::{EventError, SyncRun};
use crate::source::EventSource;
use crate::status::{SyncStatus, SyncStatusStore};
use crate::store::NoteStore;
use crate::summary::DailySummaryWriter;
use crate::tracker::CurrentMeetingTracker;

/// Which dates a cycle fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchWindow {
    Fixed(DateRange),
    /// Recomputed around `now` at every cycle
    Rolling { days_back: u32, days_ahead: u32 },
}

impl FetchWindow {
    pub fn resolve(&self, now: DateTime<Utc>, tz: &Tz) -> DateRange {
        match self {
            FetchWindow::Fixed(range) => *range,
            FetchWindow::Rolling { days_back, days_ahead } => {
                DateRange::around(now, tz, *days_back, *days_ahead)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub window: FetchWindow,
    pub interval: Duration,
    pub timezone: Tz,
    pub matcher: MeetingMatcher,
    pub layout: FolderLayout,
    /// Relative to the vault root
    pub events_folder: PathBuf,
    /// Relative to the vault root
    pub pointer_file: PathBuf,
    /// Folder for daily summaries, relative to the vault root; `None` disables them
    pub daily_summary_folder: Option<PathBuf>,
}

impl SchedulerConfig {
    pub fn from_config(config: &DayflowConfig, window: FetchWindow) -> DayflowResult<Self> {
        Ok(SchedulerConfig {
            window,
            interval: config.interval(),
            timezone: config.timezone()?,
            matcher: config.matcher(),
            layout: config.folder_layout,
            events_folder: config.events_folder.clone(),
            pointer_file: config.pointer_file.clone(),
            daily_summary_folder: config
                .daily_summary
                .then(|| config.daily_summary_folder.clone()),
        })
    }
}

/// How a single cycle ended.
#[derive(Debug)]
pub enum CycleOutcome {
    Completed(SyncRun),
    Failed(DayflowError),
    /// Cancelled before any note was written; nothing was recorded
    Cancelled,
}

/// Totals for a continuous run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContinuousSummary {
    pub completed: u64,
    pub failed: u64,
}

pub struct SyncScheduler<S, N> {
    config: SchedulerConfig,
    source: S,
    store: N,
    status_store: SyncStatusStore,
    placer: NotePlacer,
    tracker: CurrentMeetingTracker,
    summaries: Option<DailySummaryWriter>,
    clock: Arc<dyn Clock>,
    progress: Option<ProgressSender>,
    state: SchedulerState,
}

impl<S: EventSource, N: NoteStore> SyncScheduler<S, N> {
    pub fn new(config: SchedulerConfig, source: S, store: N, status_store: SyncStatusStore) -> Self {
        let placer = NotePlacer::new(config.events_folder.clone(), config.layout, config.timezone);
        let tracker = CurrentMeetingTracker::new(config.pointer_file.clone(), placer.clone());
        let summaries = config
            .daily_summary_folder
            .clone()
            .map(|folder| DailySummaryWriter::new(folder, placer.clone()));

        SyncScheduler {
            config,
            source,
            store,
            status_store,
            placer,
            tracker,
            summaries,
            clock: Arc::new(SystemClock),
            progress: None,
            state: SchedulerState::Idle,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn store(&self) -> &N {
        &self.store
    }

    pub fn status_store(&self) -> &SyncStatusStore {
        &self.status_store
    }

    /// Run a single cycle and stop.
    pub async fn run_once(&mut self, cancel: &CancellationToken) -> DayflowResult<SyncRun> {
        self.set_state(SchedulerState::Running);
        let outcome = self.run_cycle(cancel, None).await;

        let result = match outcome {
            CycleOutcome::Completed(run) => Ok(run),
            CycleOutcome::Failed(e) => {
                self.set_state(SchedulerState::Failed);
                Err(e)
            }
            CycleOutcome::Cancelled => Err(DayflowError::Cancelled),
        };

        self.set_state(SchedulerState::Stopped);
        result
    }

    /// Cycle every `interval` until `cancel` fires. Cycle errors are recorded
    /// and the loop carries on at the next tick.
    pub async fn run_continuous(&mut self, cancel: &CancellationToken) -> ContinuousSummary {
        let interval = self.config.interval;
        let interval_minutes = interval.as_secs() / 60;
        let mut summary = ContinuousSummary::default();

        info!(interval_minutes, source = %self.source.describe(), "Starting continuous sync");

        while !cancel.is_cancelled() {
            self.set_state(SchedulerState::Running);

            match self.run_cycle(cancel, Some(interval_minutes)).await {
                CycleOutcome::Completed(run) => {
                    summary.completed += 1;
                    if run.interrupted {
                        break;
                    }
                }
                CycleOutcome::Failed(_) => {
                    summary.failed += 1;
                    self.set_state(SchedulerState::Failed);
                }
                CycleOutcome::Cancelled => break,
            }

            self.set_state(SchedulerState::Sleeping);
            let wake_at = chrono::Duration::from_std(interval)
                .ok()
                .and_then(|delta| self.clock.now().checked_add_signed(delta))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            self.emit(SyncProgress::SleepingUntil(wake_at));
            debug!(%wake_at, "Sleeping until next sync");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        self.set_state(SchedulerState::Stopped);
        info!(completed = summary.completed, failed = summary.failed, "Continuous sync stopped");
        summary
    }

    async fn run_cycle(&self, cancel: &CancellationToken, interval_minutes: Option<u64>) -> CycleOutcome {
        let started_at = self.clock.now();
        let mut status = self.status_store.load();
        if interval_minutes.is_some() {
            status.interval_minutes = interval_minutes;
        }

        let tz = self.config.timezone;
        let range = self.config.window.resolve(started_at, &tz);
        info!(%range, source = %self.source.describe(), "Starting sync cycle");
        self.emit(SyncProgress::FetchStarted(range));

        // Dropping the fetch future abandons the request; nothing has been written yet
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Sync cancelled during fetch");
                return CycleOutcome::Cancelled;
            }
            result = self.source.fetch(&range) => result,
        };

        let events = match fetched {
            Ok(events) => events,
            Err(e) => {
                if let SourceError::AuthExpired(_) = e {
                    self.emit(SyncProgress::AuthExpired(e.clone()));
                }
                warn!(kind = e.kind(), error = %e, "Fetch failed");
                return self.fail_cycle(status, e.into());
            }
        };

        self.emit(SyncProgress::FetchCompleted { events: events.len() });

        let mut run = SyncRun::new(started_at);
        run.events_fetched = events.len();
        let events: Vec<_> = events.into_iter().filter(|e| !e.is_cancelled()).collect();

        let classified = self.config.matcher.classify(&events, self.clock.now());

        for event in &events {
            if cancel.is_cancelled() {
                info!(placed = run.events_written + run.events_skipped, "Sync interrupted between events");
                run.interrupted = true;
                break;
            }

            match self.placer.sync_event(event, &self.store) {
                Ok((path, placement)) => {
                    match placement {
                        Placement::Created => run.events_written += 1,
                        Placement::Skipped => run.events_skipped += 1,
                    }
                    debug!(event_id = event.id(), path = %path, ?placement, "Placed event");
                    self.emit(SyncProgress::EventPlaced {
                        title: event.to_string(),
                        path,
                        placement,
                    });
                }
                Err(e) => {
                    warn!(event_id = event.id(), error = %e, "Failed to write note");
                    self.emit(SyncProgress::EventFailed {
                        title: event.to_string(),
                        message: e.to_string(),
                    });
                    run.errors.push(EventError {
                        event_id: event.id().to_string(),
                        title: event.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if !run.interrupted {
            self.write_summaries(&events, classified.current, &mut run);
        }

        if let Err(e) = self.tracker.update(classified.current, &self.store) {
            return self.fail_cycle(status, e);
        }
        run.current = classified.current.map(|e| e.to_string());
        run.finished_at = self.clock.now();

        status.record_success(&run);
        if let Err(e) = self.status_store.save(&status) {
            warn!(error = %e, "Failed to save sync status");
            self.emit(SyncProgress::CycleFailed { message: e.to_string() });
            return CycleOutcome::Failed(e);
        }

        info!(
            fetched = run.events_fetched,
            written = run.events_written,
            skipped = run.events_skipped,
            errors = run.errors.len(),
            current = run.current.as_deref().unwrap_or("-"),
            "Sync cycle complete"
        );
        self.emit(SyncProgress::CycleCompleted(run.clone()));
        CycleOutcome::Completed(run)
    }

    /// Rewrite the summary of every day with events. Failures are recorded
    /// per day like note failures.
    fn write_summaries(&self, events: &[CalendarEvent], current: Option<&CalendarEvent>, run: &mut SyncRun) {
        let Some(writer) = &self.summaries else {
            return;
        };

        for (date, day) in writer.group_by_day(events) {
            match writer.write_day(date, &day, current, &self.store) {
                Ok(path) => {
                    debug!(%date, path = %path.display(), "Wrote daily summary");
                    run.summaries_written += 1;
                }
                Err(e) => {
                    warn!(%date, error = %e, "Failed to write daily summary");
                    let title = format!("{date} Daily Summary");
                    self.emit(SyncProgress::EventFailed {
                        title: title.clone(),
                        message: e.to_string(),
                    });
                    run.errors.push(EventError {
                        event_id: date.to_string(),
                        title,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    fn fail_cycle(&self, mut status: SyncStatus, error: DayflowError) -> CycleOutcome {
        status.record_failure(self.clock.now(), &error);
        if let Err(e) = self.status_store.save(&status) {
            warn!(error = %e, "Failed to save sync status");
        }

        self.emit(SyncProgress::CycleFailed { message: error.to_string() });
        CycleOutcome::Failed(error)
    }

    fn set_state(&mut self, state: SchedulerState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Scheduler state changed");
            self.state = state;
            self.emit(SyncProgress::StateChanged(state));
        }
    }

    fn emit(&self, progress: SyncProgress) {
        if let Some(tx) = &self.progress {
            // The receiver going away only means nobody is watching
            let _ = tx.send(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::progress::{self, ProgressReceiver};
    use crate::store::MemoryNoteStore;
    use crate::tracker::DEFAULT_POINTER_FILE;
    use chrono::{NaiveDate, TimeZone};
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns queued responses in order, then `fallback` forever.
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Vec<CalendarEvent>, SourceError>>>,
        fallback: Vec<CalendarEvent>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn always(events: Vec<CalendarEvent>) -> Self {
            Self::scripted(Vec::new(), events)
        }

        fn scripted(
            responses: Vec<Result<Vec<CalendarEvent>, SourceError>>,
            fallback: Vec<CalendarEvent>,
        ) -> Self {
            ScriptedSource {
                responses: Mutex::new(responses.into()),
                fallback,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl EventSource for ScriptedSource {
        fn describe(&self) -> String {
            "scripted".into()
        }

        async fn fetch(&self, _range: &DateRange) -> Result<Vec<CalendarEvent>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.responses.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(self.fallback.clone()))
        }
    }

    /// Never answers.
    struct HangingSource;

    impl EventSource for HangingSource {
        fn describe(&self) -> String {
            "hanging".into()
        }

        async fn fetch(&self, _range: &DateRange) -> Result<Vec<CalendarEvent>, SourceError> {
            std::future::pending().await
        }
    }

    /// Fails writes whose path contains `fail_on`, and can cancel a token on
    /// the first successful write.
    #[derive(Default)]
    struct TestStore {
        inner: MemoryNoteStore,
        fail_on: Option<String>,
        cancel_on_write: Option<CancellationToken>,
    }

    impl NoteStore for TestStore {
        fn exists(&self, path: &Path) -> bool {
            self.inner.exists(path)
        }

        fn write(&self, path: &Path, content: &str) -> std::io::Result<()> {
            if let Some(fail_on) = &self.fail_on {
                if path.to_string_lossy().contains(fail_on.as_str()) {
                    return Err(std::io::Error::other("disk full"));
                }
            }
            if let Some(token) = &self.cancel_on_write {
                token.cancel();
            }
            self.inner.write(path, content)
        }

        fn read_pointer(&self, path: &Path) -> std::io::Result<Option<String>> {
            self.inner.read_pointer(path)
        }

        fn write_pointer_atomic(&self, path: &Path, content: &str) -> std::io::Result<()> {
            self.inner.write_pointer_atomic(path, content)
        }
    }

    /// Wall clock that follows tokio's (paused) clock.
    struct VirtualClock {
        base: DateTime<Utc>,
        started: tokio::time::Instant,
    }

    impl VirtualClock {
        fn new(base: DateTime<Utc>) -> Self {
            VirtualClock {
                base,
                started: tokio::time::Instant::now(),
            }
        }
    }

    impl Clock for VirtualClock {
        fn now(&self) -> DateTime<Utc> {
            let elapsed = chrono::Duration::from_std(self.started.elapsed()).unwrap();
            self.base + elapsed
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, h, m, 0).unwrap()
    }

    fn meeting(id: &str, title: &str, start: (u32, u32), end: (u32, u32)) -> CalendarEvent {
        CalendarEvent::new(id, title, at(start.0, start.1), at(end.0, end.1)).unwrap()
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            window: FetchWindow::Rolling { days_back: 1, days_ahead: 1 },
            interval: Duration::from_secs(600),
            timezone: chrono_tz::UTC,
            matcher: MeetingMatcher::default(),
            layout: FolderLayout::YearMonthDay,
            events_folder: PathBuf::from("Calendar Events"),
            pointer_file: PathBuf::from(DEFAULT_POINTER_FILE),
            daily_summary_folder: None,
        }
    }

    fn config_with_summaries() -> SchedulerConfig {
        SchedulerConfig {
            daily_summary_folder: Some(PathBuf::from("Daily Notes")),
            ..config()
        }
    }

    fn status_store(dir: &tempfile::TempDir) -> SyncStatusStore {
        SyncStatusStore::new(dir.path().join("sync_status.json"))
    }

    fn drain(rx: &mut ProgressReceiver) -> Vec<SyncProgress> {
        let mut out = Vec::new();
        while let Ok(p) = rx.try_recv() {
            out.push(p);
        }
        out
    }

    fn states(progress: &[SyncProgress]) -> Vec<SchedulerState> {
        progress
            .iter()
            .filter_map(|p| match p {
                SyncProgress::StateChanged(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_run_once_writes_notes_and_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::always(vec![
            meeting("a", "Standup", (9, 0), (9, 30)),
            meeting("b", "Design Review", (14, 0), (15, 0)),
        ]);
        let (tx, mut rx) = progress::channel();
        let mut scheduler = SyncScheduler::new(config(), source, MemoryNoteStore::new(), status_store(&dir))
            .with_clock(FixedClock(at(9, 10)))
            .with_progress(tx);

        let run = scheduler.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(run.events_fetched, 2);
        assert_eq!(run.events_written, 2);
        assert_eq!(run.events_skipped, 0);
        assert_eq!(run.current.as_deref(), Some("Standup"));
        assert!(!run.interrupted);

        let store = scheduler.store();
        assert!(store.exists(Path::new("Calendar Events/2024/03/15/0900 - Standup.md")));
        assert!(store.exists(Path::new("Calendar Events/2024/03/15/1400 - Design Review.md")));
        let pointer = store.read_pointer(Path::new(DEFAULT_POINTER_FILE)).unwrap().unwrap();
        assert!(pointer.contains("[[0900 - Standup|Standup]]"));

        let status = scheduler.status_store().load();
        assert_eq!(status.total_sync_count, 1);
        assert_eq!(status.last_sync_at, Some(at(9, 10)));
        assert_eq!(status.interval_minutes, None);

        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(
            states(&drain(&mut rx)),
            vec![SchedulerState::Running, SchedulerState::Stopped]
        );
    }

    #[tokio::test]
    async fn test_second_cycle_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::always(vec![meeting("a", "Standup", (9, 0), (9, 30))]);
        let mut scheduler = SyncScheduler::new(config(), source, MemoryNoteStore::new(), status_store(&dir))
            .with_clock(FixedClock(at(9, 10)));
        let cancel = CancellationToken::new();

        let first = scheduler.run_once(&cancel).await.unwrap();
        let note = Path::new("Calendar Events/2024/03/15/0900 - Standup.md");
        let before = scheduler.store().get(note);

        let second = scheduler.run_once(&cancel).await.unwrap();

        assert_eq!(first.events_written, 1);
        assert_eq!(second.events_written, 0);
        assert_eq!(second.events_skipped, 1);
        assert_eq!(scheduler.store().get(note), before);
        assert_eq!(scheduler.status_store().load().total_sync_count, 2);
    }

    #[tokio::test]
    async fn test_cancelled_events_are_not_placed() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::always(vec![
            meeting("a", "Standup", (9, 0), (9, 30)).mark_cancelled(),
            meeting("b", "Lunch", (12, 0), (13, 0)),
        ]);
        let mut scheduler = SyncScheduler::new(config(), source, MemoryNoteStore::new(), status_store(&dir))
            .with_clock(FixedClock(at(9, 10)));

        let run = scheduler.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(run.events_fetched, 2);
        assert_eq!(run.events_written, 1);
        assert_eq!(run.current, None);
        let pointer = scheduler
            .store()
            .read_pointer(Path::new(DEFAULT_POINTER_FILE))
            .unwrap()
            .unwrap();
        assert!(pointer.contains(crate::render::NO_ACTIVE_MEETING));
    }

    #[tokio::test]
    async fn test_note_write_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::always(vec![
            meeting("a", "Standup", (9, 0), (9, 30)),
            meeting("b", "Design Review", (14, 0), (15, 0)),
        ]);
        let store = TestStore {
            fail_on: Some("Standup".into()),
            ..TestStore::default()
        };
        let mut scheduler = SyncScheduler::new(config(), source, store, status_store(&dir))
            .with_clock(FixedClock(at(9, 10)));

        let run = scheduler.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(run.events_written, 1);
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].event_id, "a");
        assert!(run.errors[0].message.contains("disk full"));

        let status = scheduler.status_store().load();
        assert_eq!(status.total_sync_count, 1);
        assert_eq!(status.total_error_count, 1);
        assert!(status.last_error.is_some());
    }

    #[tokio::test]
    async fn test_one_shot_source_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::scripted(
            vec![Err(SourceError::Unavailable("connection refused".into()))],
            Vec::new(),
        );
        let (tx, mut rx) = progress::channel();
        let mut scheduler = SyncScheduler::new(config(), source, MemoryNoteStore::new(), status_store(&dir))
            .with_clock(FixedClock(at(9, 10)))
            .with_progress(tx);

        let err = scheduler.run_once(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DayflowError::Source(SourceError::Unavailable(_))));

        let status = scheduler.status_store().load();
        assert_eq!(status.total_sync_count, 0);
        assert_eq!(status.total_error_count, 1);
        assert!(status.last_error.unwrap().contains("connection refused"));
        assert!(scheduler.store().is_empty());

        assert_eq!(
            states(&drain(&mut rx)),
            vec![SchedulerState::Running, SchedulerState::Failed, SchedulerState::Stopped]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_fetch_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = SyncScheduler::new(config(), HangingSource, MemoryNoteStore::new(), status_store(&dir))
            .with_clock(FixedClock(at(9, 10)));

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let err = scheduler.run_once(&cancel).await.unwrap_err();
        assert!(matches!(err, DayflowError::Cancelled));
        assert!(!scheduler.status_store().path().exists());
        assert!(scheduler.store().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_between_events_marks_run_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let source = ScriptedSource::always(vec![
            meeting("a", "Standup", (9, 0), (9, 30)),
            meeting("b", "Design Review", (14, 0), (15, 0)),
        ]);
        let store = TestStore {
            cancel_on_write: Some(cancel.clone()),
            ..TestStore::default()
        };
        let mut scheduler = SyncScheduler::new(config(), source, store, status_store(&dir))
            .with_clock(FixedClock(at(9, 10)));

        let run = scheduler.run_once(&cancel).await.unwrap();

        assert!(run.interrupted);
        assert_eq!(run.events_written, 1);
        // The pointer and status are still brought up to date
        assert_eq!(run.current.as_deref(), Some("Standup"));
        assert!(scheduler.store().inner.exists(Path::new(DEFAULT_POINTER_FILE)));
        assert_eq!(scheduler.status_store().load().total_sync_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_sleep_stops_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::always(vec![meeting("a", "Standup", (9, 0), (9, 30))]);
        let mut scheduler = SyncScheduler::new(config(), source, MemoryNoteStore::new(), status_store(&dir))
            .with_clock(VirtualClock::new(at(9, 10)));

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            canceller.cancel();
        });

        let started = tokio::time::Instant::now();
        let summary = scheduler.run_continuous(&cancel).await;

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(summary, ContinuousSummary { completed: 1, failed: 0 });
        assert_eq!(scheduler.state(), SchedulerState::Stopped);

        let status = scheduler.status_store().load();
        assert_eq!(status.total_sync_count, summary.completed);
        assert_eq!(status.interval_minutes, Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_cycles_every_interval() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::always(vec![meeting("a", "Standup", (9, 0), (9, 30))]);
        let (tx, mut rx) = progress::channel();
        let mut scheduler = SyncScheduler::new(config(), source, MemoryNoteStore::new(), status_store(&dir))
            .with_clock(VirtualClock::new(at(9, 10)))
            .with_progress(tx);

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        // Two full intervals plus a bit: cycles at 0s, 600s and 1200s
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1202)).await;
            canceller.cancel();
        });

        let summary = scheduler.run_continuous(&cancel).await;
        assert_eq!(summary.completed, 3);
        assert_eq!(scheduler.source.calls.load(Ordering::SeqCst), 3);

        // The pointer follows the clock: current at 09:10, recently ended by 09:30
        let progress = drain(&mut rx);
        let currents: Vec<Option<String>> = progress
            .iter()
            .filter_map(|p| match p {
                SyncProgress::CycleCompleted(run) => Some(run.current.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(currents, vec![Some("Standup".to_string()), Some("Standup".to_string()), None]);

        let wake = progress.iter().find_map(|p| match p {
            SyncProgress::SleepingUntil(at) => Some(*at),
            _ => None,
        });
        assert_eq!(wake, Some(at(9, 20)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_failure_in_continuous_mode_keeps_looping() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::scripted(
            vec![
                Err(SourceError::Unavailable("timeout".into())),
                Err(SourceError::AuthExpired("token revoked".into())),
            ],
            vec![meeting("a", "Standup", (9, 0), (9, 30))],
        );
        let (tx, mut rx) = progress::channel();
        let mut scheduler = SyncScheduler::new(config(), source, MemoryNoteStore::new(), status_store(&dir))
            .with_clock(VirtualClock::new(at(9, 0)))
            .with_progress(tx);

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1201)).await;
            canceller.cancel();
        });

        let summary = scheduler.run_continuous(&cancel).await;
        assert_eq!(summary, ContinuousSummary { completed: 1, failed: 2 });

        let status = scheduler.status_store().load();
        assert_eq!(status.total_sync_count, 1);
        assert_eq!(status.total_error_count, 2);
        assert_eq!(status.last_error, None);

        let progress = drain(&mut rx);
        let auth_expired = progress
            .iter()
            .filter(|p| matches!(p, SyncProgress::AuthExpired(_)))
            .count();
        assert_eq!(auth_expired, 1);
        assert!(states(&progress).contains(&SchedulerState::Failed));
    }

    #[test]
    fn test_fetch_window_resolution() {
        let fixed = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap();
        assert_eq!(FetchWindow::Fixed(fixed).resolve(at(9, 0), &chrono_tz::UTC), fixed);

        let rolling = FetchWindow::Rolling { days_back: 1, days_ahead: 2 }.resolve(at(9, 0), &chrono_tz::UTC);
        assert_eq!(rolling.start, NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
        assert_eq!(rolling.end, NaiveDate::from_ymd_opt(2024, 3, 17).unwrap());
    }

    #[tokio::test]
    async fn test_daily_summaries_are_rewritten_each_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let tomorrow = CalendarEvent::new(
            "c",
            "Retro",
            Utc.with_ymd_and_hms(2024, 3, 16, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 16, 11, 0, 0).unwrap(),
        )
        .unwrap();
        let source = ScriptedSource::always(vec![
            meeting("a", "Standup", (9, 0), (9, 30)),
            meeting("b", "Design Review", (14, 0), (15, 0)),
            meeting("x", "Cancelled Sync", (11, 0), (12, 0)).mark_cancelled(),
            tomorrow,
        ]);
        let mut scheduler = SyncScheduler::new(
            config_with_summaries(),
            source,
            MemoryNoteStore::new(),
            status_store(&dir),
        )
        .with_clock(FixedClock(at(9, 10)));
        let cancel = CancellationToken::new();

        let run = scheduler.run_once(&cancel).await.unwrap();
        assert_eq!(run.summaries_written, 2);

        let today = Path::new("Daily Notes/2024-03-15 Daily Summary.md");
        let summary = scheduler.store().get(today).unwrap();
        assert!(summary.contains("meetings_count: 2"));
        assert!(summary.contains("**NOW** | **09:00-09:30** | [[0900 - Standup]]"));
        assert!(!summary.contains("Cancelled Sync"));
        let next_day = scheduler
            .store()
            .get(Path::new("Daily Notes/2024-03-16 Daily Summary.md"))
            .unwrap();
        assert!(!next_day.contains("**NOW**"));

        // Event notes are skipped the second time, summaries are not
        let second = scheduler.run_once(&cancel).await.unwrap();
        assert_eq!(second.events_written, 0);
        assert_eq!(second.summaries_written, 2);
    }

    #[tokio::test]
    async fn test_summary_write_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::always(vec![meeting("a", "Standup", (9, 0), (9, 30))]);
        let store = TestStore {
            fail_on: Some("Daily Summary".into()),
            ..TestStore::default()
        };
        let mut scheduler = SyncScheduler::new(config_with_summaries(), source, store, status_store(&dir))
            .with_clock(FixedClock(at(9, 10)));

        let run = scheduler.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(run.events_written, 1);
        assert_eq!(run.summaries_written, 0);
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].event_id, "2024-03-15");
        assert!(scheduler.store().inner.exists(Path::new(DEFAULT_POINTER_FILE)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_interval_sleeps_without_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::always(Vec::new());
        let config = SchedulerConfig {
            interval: Duration::from_secs(60 * 1_000_000_000_000),
            ..config()
        };
        let (tx, mut rx) = progress::channel();
        let mut scheduler = SyncScheduler::new(config, source, MemoryNoteStore::new(), status_store(&dir))
            .with_clock(FixedClock(at(9, 10)))
            .with_progress(tx);

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let summary = scheduler.run_continuous(&cancel).await;
        assert_eq!(summary.completed, 1);

        let wake = drain(&mut rx).into_iter().find_map(|p| match p {
            SyncProgress::SleepingUntil(at) => Some(at),
            _ => None,
        });
        assert!(wake.unwrap() > at(9, 10));
    }
}
