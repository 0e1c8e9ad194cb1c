//! Durable sync status and the run lock.
//!
//! The status file is a small JSON document rewritten after every cycle.
//! It is read by `dayflow status` while a continuous run may be writing it,
//! so saves go through a temp file and a rename. Every run that writes the
//! status holds the run lock, so there is a single writer at a time.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::{DayflowError, DayflowResult};
use crate::run::SyncRun;
use crate::store::write_atomic;

const STATUS_FILE: &str = "sync_status.json";
const LOCK_FILE: &str = "sync.lock";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncStatus {
    pub last_sync_at: Option<DateTime<Utc>>,
    pub total_sync_count: u64,
    pub total_error_count: u64,
    pub last_error: Option<String>,
    /// Set by continuous runs
    pub interval_minutes: Option<u64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SyncStatus {
    /// Fold a completed cycle into the totals. Per-event errors count
    /// towards the error total.
    pub fn record_success(&mut self, run: &SyncRun) {
        self.last_sync_at = Some(run.started_at);
        self.total_sync_count += 1;
        self.total_error_count += run.errors.len() as u64;
        self.last_error = run.errors.first().map(|e| e.to_string());
        self.updated_at = Some(run.finished_at);
    }

    pub fn record_failure(&mut self, at: DateTime<Utc>, error: &DayflowError) {
        self.total_error_count += 1;
        self.last_error = Some(error.to_string());
        self.updated_at = Some(at);
    }

    pub fn time_since_last_sync(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_sync_at.map(|at| now - at)
    }
}

/// How syncs are currently being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// A continuous run holds the lock
    Continuous,
    /// Nothing running, or a one-shot sync
    Manual,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Continuous => write!(f, "continuous"),
            SyncMode::Manual => write!(f, "manual"),
        }
    }
}

/// Held for the lifetime of a sync run. Dropping it releases the lock.
#[derive(Debug)]
pub struct RunLock {
    _file: File,
}

#[derive(Debug, Clone)]
pub struct SyncStatusStore {
    path: PathBuf,
}

impl SyncStatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SyncStatusStore { path: path.into() }
    }

    /// `~/.local/share/dayflow/sync_status.json` on Linux
    pub fn default_path() -> DayflowResult<PathBuf> {
        let dir = dirs::data_local_dir()
            .ok_or_else(|| DayflowError::Config("Could not determine data directory".into()))?;
        Ok(dir.join("dayflow").join(STATUS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_file_name(LOCK_FILE)
    }

    /// Load the status. A missing or unreadable file yields the default.
    pub fn load(&self) -> SyncStatus {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return SyncStatus::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Could not read sync status, starting fresh");
                return SyncStatus::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Sync status is corrupt, starting fresh");
                SyncStatus::default()
            }
        }
    }

    pub fn save(&self, status: &SyncStatus) -> DayflowResult<()> {
        let json = serde_json::to_vec_pretty(status)
            .map_err(|e| DayflowError::Serialization(e.to_string()))?;
        write_atomic(&self.path, &json)?;
        Ok(())
    }

    /// Take the run lock, failing if another run holds it. The holder's
    /// mode is written into the lock file for [`Self::mode`].
    pub fn acquire_run_lock(&self, mode: SyncMode) -> DayflowResult<RunLock> {
        let path = self.lock_path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        // Not truncated before locking: the current holder's mode must survive
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| DayflowError::AlreadyRunning(path.clone()))?;

        file.set_len(0)?;
        file.write_all(mode.to_string().as_bytes())?;

        tracing::debug!(path = %path.display(), %mode, "Acquired sync lock");
        Ok(RunLock { _file: file })
    }

    pub fn mode(&self) -> SyncMode {
        let Ok(mut file) = OpenOptions::new().read(true).open(self.lock_path()) else {
            return SyncMode::Manual;
        };

        if file.try_lock_shared().is_ok() {
            let _ = FileExt::unlock(&file);
            return SyncMode::Manual;
        }

        let mut holder = String::new();
        let _ = file.read_to_string(&mut holder);
        if holder.trim() == SyncMode::Manual.to_string() {
            SyncMode::Manual
        } else {
            SyncMode::Continuous
        }
    }
}
