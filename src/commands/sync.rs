use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use dayflow_core::progress::{self, ProgressReceiver};
use dayflow_core::{
    AnySource, DateRange, DayflowConfig, DayflowError, FetchWindow, FsNoteStore, MemoryNoteStore,
    NoteStore, Placement, SchedulerConfig, SyncMode, SyncProgress, SyncScheduler, SyncStatusStore,
};
use indicatif::ProgressBar;
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

use crate::render::{Render, render_placement};
use crate::utils::tui;

pub struct SyncArgs {
    pub start: Option<String>,
    pub end: Option<String>,
    pub continuous: bool,
    pub interval: Option<u64>,
    pub quiet: bool,
    pub dry_run: bool,
    pub no_daily_summary: bool,
}

pub async fn run(args: SyncArgs) -> Result<ExitCode> {
    let mut config = DayflowConfig::load()?;
    if let Some(interval) = args.interval {
        config.interval_minutes = interval;
    }
    if args.no_daily_summary {
        config.daily_summary = false;
    }
    config.validate()?;

    let tz = config.timezone()?;
    let vault = config.vault_path()?;
    let source = AnySource::from_config(&config)?;

    let window = if args.continuous && args.start.is_none() && args.end.is_none() {
        FetchWindow::Rolling {
            days_back: config.days_back,
            days_ahead: config.days_ahead,
        }
    } else {
        let today = Utc::now().with_timezone(&tz).date_naive();
        let range = DateRange::from_args(args.start.as_deref(), args.end.as_deref(), today)
            .map_err(|e| anyhow::anyhow!(e))?;
        FetchWindow::Fixed(range)
    };
    let scheduler_config = SchedulerConfig::from_config(&config, window)?;

    if args.dry_run {
        // Scratch status so a dry run doesn't count as a sync
        let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
        let status_store = SyncStatusStore::new(scratch.path().join("sync_status.json"));
        let store = DryRunStore::new(&vault);
        let code = drive(scheduler_config, source, store, status_store, &args, tz).await?;
        return Ok(code);
    }

    let status_store = config.status_store()?;
    let mode = if args.continuous { SyncMode::Continuous } else { SyncMode::Manual };
    let _lock = status_store.acquire_run_lock(mode)?;

    drive(scheduler_config, source, FsNoteStore::new(vault), status_store, &args, tz).await
}

async fn drive<N: NoteStore>(
    config: SchedulerConfig,
    source: AnySource,
    store: N,
    status_store: SyncStatusStore,
    args: &SyncArgs,
    tz: Tz,
) -> Result<ExitCode> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown requested, finishing the current write");
        on_interrupt.cancel();
    });

    let (tx, rx) = progress::channel();
    let printer = tokio::spawn(print_progress(rx, args.quiet, args.dry_run, tz));

    let mut scheduler = SyncScheduler::new(config, source, store, status_store).with_progress(tx);

    let code = if args.continuous {
        let summary = scheduler.run_continuous(&cancel).await;
        drop(scheduler);
        let _ = printer.await;

        if !args.quiet {
            println!(
                "\nStopped after {} {} ({} failed)",
                summary.completed + summary.failed,
                if summary.completed + summary.failed == 1 { "cycle" } else { "cycles" },
                summary.failed
            );
        }
        ExitCode::SUCCESS
    } else {
        let result = scheduler.run_once(&cancel).await;
        drop(scheduler);
        let _ = printer.await;

        match result {
            Ok(_) | Err(DayflowError::Cancelled) => ExitCode::SUCCESS,
            // Needs the user to re-authenticate, retrying won't help
            Err(e) if e.is_auth_expired() => ExitCode::FAILURE,
            Err(DayflowError::Source(e)) if e.is_transient() => {
                if !args.quiet {
                    println!("{}", "The calendar source should recover; try again in a few minutes".dimmed());
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::debug!(error = %e, "One-shot sync failed");
                ExitCode::SUCCESS
            }
        }
    };

    Ok(code)
}

/// Ctrl-C, or SIGTERM from a service manager.
async fn shutdown_signal() {
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
}

async fn print_progress(mut rx: ProgressReceiver, quiet: bool, dry_run: bool, tz: Tz) {
    let mut spinner: Option<ProgressBar> = None;

    while let Some(progress) = rx.recv().await {
        match progress {
            SyncProgress::FetchStarted(range) => {
                spinner = Some(tui::create_spinner(format!("Fetching {range}"), quiet));
            }
            SyncProgress::FetchCompleted { .. } => {
                if let Some(s) = spinner.take() {
                    s.finish_and_clear();
                }
            }
            SyncProgress::EventPlaced { title, path, placement } => {
                if !quiet && placement == Placement::Created {
                    println!("{}", render_placement(&title, &path, placement));
                }
            }
            SyncProgress::EventFailed { title, message } => {
                eprintln!("   {} {}: {}", "!".red(), title, message.red());
            }
            SyncProgress::CycleCompleted(run) => {
                if !quiet {
                    if dry_run {
                        println!("{}", "Dry run: nothing was written".yellow());
                    }
                    println!("{}", run.render());
                }
            }
            SyncProgress::CycleFailed { message } => {
                if let Some(s) = spinner.take() {
                    s.finish_and_clear();
                }
                eprintln!("{} {}", "Sync failed:".red(), message);
            }
            SyncProgress::AuthExpired(_) => {
                eprintln!(
                    "{}",
                    "Calendar credentials have expired. Re-authenticate your provider, then sync again."
                        .red()
                        .bold()
                );
            }
            SyncProgress::SleepingUntil(at) => {
                if !quiet {
                    let local = at.with_timezone(&tz);
                    println!("{}", format!("Next sync at {}", local.format("%H:%M")).dimmed());
                }
            }
            SyncProgress::StateChanged(state) => {
                tracing::debug!(%state, "Scheduler state");
            }
        }
    }

    if let Some(s) = spinner.take() {
        s.finish_and_clear();
    }
}

/// Sees the real vault but keeps every write in memory.
struct DryRunStore {
    vault: FsNoteStore,
    pending: MemoryNoteStore,
}

impl DryRunStore {
    fn new(vault: &Path) -> Self {
        DryRunStore {
            vault: FsNoteStore::new(vault),
            pending: MemoryNoteStore::new(),
        }
    }
}

impl NoteStore for DryRunStore {
    fn exists(&self, path: &Path) -> bool {
        self.pending.exists(path) || self.vault.exists(path)
    }

    fn write(&self, path: &Path, content: &str) -> std::io::Result<()> {
        self.pending.write(path, content)
    }

    fn read_pointer(&self, path: &Path) -> std::io::Result<Option<String>> {
        match self.pending.read_pointer(path)? {
            Some(content) => Ok(Some(content)),
            None => self.vault.read_pointer(path),
        }
    }

    fn write_pointer_atomic(&self, path: &Path, content: &str) -> std::io::Result<()> {
        self.pending.write_pointer_atomic(path, content)
    }
}
