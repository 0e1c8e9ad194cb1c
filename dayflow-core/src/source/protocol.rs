//! JSON protocol spoken with provider binaries over stdin/stdout.
//!
//! A provider is any executable named `dayflow-provider-<name>` on `PATH`.
//! It reads one [`Request`] line and answers with one [`Response`].

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::SourceError;

pub trait ProviderCommand: Serialize {
    type Response: DeserializeOwned;
    fn command() -> Command;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    ListEvents,
}

/// Request sent to the provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub command: Command,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Response read back from the provider.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response<T> {
    Success {
        data: T,
    },
    Error {
        error: String,
        #[serde(default)]
        kind: ErrorKind,
    },
}

/// Classification of a provider error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthExpired,
    RateLimited,
    #[default]
    Unavailable,
}

impl ErrorKind {
    pub fn into_error(self, message: String) -> SourceError {
        match self {
            ErrorKind::AuthExpired => SourceError::AuthExpired(message),
            ErrorKind::RateLimited => SourceError::RateLimited(message),
            ErrorKind::Unavailable => SourceError::Unavailable(message),
        }
    }
}

/// List events between two dates (inclusive, `YYYY-MM-DD`).
#[derive(Debug, Serialize, Deserialize)]
pub struct ListEvents {
    /// Provider-specific settings from the `[source]` config table
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
    pub from: String,
    pub to: String,
}

impl ProviderCommand for ListEvents {
    // Events are validated one by one so a bad record doesn't sink the batch
    type Response = Vec<serde_json::Value>;
    fn command() -> Command {
        Command::ListEvents
    }
}
