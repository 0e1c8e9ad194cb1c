//! Error types for dayflow.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by a calendar source.
///
/// The variants separate a credential problem from transient ones so the
/// caller can ask for re-authentication without tearing the loop down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Calendar credentials expired or invalid: {0}")]
    AuthExpired(String),

    #[error("Rate limited by calendar source: {0}")]
    RateLimited(String),

    #[error("Calendar source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    /// Transient errors are retried at the next scheduled tick.
    pub fn is_transient(&self) -> bool {
        !matches!(self, SourceError::AuthExpired(_))
    }

    /// Stable label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::AuthExpired(_) => "auth_expired",
            SourceError::RateLimited(_) => "rate_limited",
            SourceError::Unavailable(_) => "unavailable",
        }
    }
}

/// Errors that can occur in dayflow operations.
#[derive(Error, Debug)]
pub enum DayflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vault not found at: {}", .0.display())]
    VaultNotFound(PathBuf),

    #[error("Invalid event '{id}': {reason}")]
    InvalidEvent { id: String, reason: String },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Failed to write note {}: {source}", path.display())]
    NoteWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to update pointer file {}: {source}", path.display())]
    PointerWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Provider '{0}' not found in PATH")]
    ProviderNotInstalled(String),

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("Another sync is already running.\nIf you believe this is an error, remove: {}", .0.display())]
    AlreadyRunning(PathBuf),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DayflowError {
    /// True when the cycle failed because the source rejected our credentials.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, DayflowError::Source(SourceError::AuthExpired(_)))
    }
}

/// Result type alias for dayflow operations.
pub type DayflowResult<T> = Result<T, DayflowError>;
