//! Provider subprocess source.
//!
//! Providers manage their own credentials and tokens. We only pass the
//! provider-specific parameters from the `[source]` config table.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use crate::date_range::DateRange;
use crate::error::{DayflowError, DayflowResult, SourceError};
use crate::event::CalendarEvent;
use crate::source::EventSource;
use crate::source::protocol::{Command, ListEvents, ProviderCommand, Request, Response};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ProviderSource {
    name: String,
    binary_path: PathBuf,
    params: serde_json::Map<String, serde_json::Value>,
    timeout: Duration,
}

impl ProviderSource {
    /// Resolve `dayflow-provider-<name>` on `PATH`.
    pub fn new(
        name: &str,
        params: serde_json::Map<String, serde_json::Value>,
        timeout: Duration,
    ) -> DayflowResult<Self> {
        let binary_name = format!("dayflow-provider-{name}");
        let binary_path = which::which(&binary_name).map_err(|_| {
            DayflowError::ProviderNotInstalled(format!(
                "{binary_name} (install the provider or point [source] at an .ics file)"
            ))
        })?;

        Ok(Self::with_binary(name, binary_path, params, timeout))
    }

    /// Use an explicit provider executable.
    pub fn with_binary(
        name: &str,
        binary_path: impl Into<PathBuf>,
        params: serde_json::Map<String, serde_json::Value>,
        timeout: Duration,
    ) -> Self {
        ProviderSource {
            name: name.to_string(),
            binary_path: binary_path.into(),
            params,
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call a typed provider command, bounded by the configured timeout.
    pub async fn call<C: ProviderCommand>(&self, cmd: C) -> Result<C::Response, SourceError> {
        timeout(self.timeout, self.call_raw(C::command(), cmd))
            .await
            .map_err(|_| {
                SourceError::Unavailable(format!(
                    "Provider '{}' timed out after {}s",
                    self.name,
                    self.timeout.as_secs()
                ))
            })?
    }

    async fn call_raw<P: Serialize, R: serde::de::DeserializeOwned>(
        &self,
        command: Command,
        params: P,
    ) -> Result<R, SourceError> {
        let params = serde_json::to_value(params).map_err(|e| SourceError::Unavailable(e.to_string()))?;
        let request = Request { command, params };
        let request_json = serde_json::to_string(&request).map_err(|e| SourceError::Unavailable(e.to_string()))?;

        let mut child = TokioCommand::new(&self.binary_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SourceError::Unavailable(format!("Failed to spawn {}: {}", self.binary_path.display(), e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SourceError::Unavailable("Provider stdin was not captured".into()))?;
        stdin
            .write_all(format!("{request_json}\n").as_bytes())
            .await
            .map_err(|e| SourceError::Unavailable(format!("Failed to send request: {e}")))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SourceError::Unavailable(format!("Failed to read provider output: {e}")))?;

        let response_str = String::from_utf8_lossy(&output.stdout);

        // A provider may report a typed error and still exit non-zero
        if response_str.trim().is_empty() {
            return Err(if output.status.success() {
                SourceError::Unavailable("Provider returned no response".into())
            } else {
                SourceError::Unavailable(format!(
                    "Provider exited with status: {}",
                    output.status.code().unwrap_or(-1)
                ))
            });
        }

        let response: Response<R> = serde_json::from_str(&response_str)
            .map_err(|e| SourceError::Unavailable(format!("Failed to parse response: {e}")))?;

        match response {
            Response::Success { data } => Ok(data),
            Response::Error { error, kind } => Err(kind.into_error(error)),
        }
    }
}

impl EventSource for ProviderSource {
    fn describe(&self) -> String {
        format!("provider '{}'", self.name)
    }

    async fn fetch(&self, range: &DateRange) -> Result<Vec<CalendarEvent>, SourceError> {
        let records = self
            .call(ListEvents {
                params: self.params.clone(),
                from: range.start.to_string(),
                to: range.end.to_string(),
            })
            .await?;

        let mut events = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value::<CalendarEvent>(record) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(provider = %self.name, error = %e, "Skipping invalid event from provider"),
            }
        }
        Ok(events)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("dayflow-provider-test");
        std::fs::write(&path, format!("#!/bin/sh\nread line\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn range() -> DateRange {
        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        DateRange::new(day, day).unwrap()
    }

    fn source(path: PathBuf, timeout: Duration) -> ProviderSource {
        ProviderSource::with_binary("test", path, serde_json::Map::new(), timeout)
    }

    #[tokio::test]
    async fn test_fetch_parses_events_and_skips_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            &dir,
            r#"echo '{"status":"success","data":[{"id":"a","title":"Standup","start":"2024-03-15T09:00:00Z","end":"2024-03-15T09:30:00Z"},{"id":"b","title":"Bad","start":"2024-03-15T10:00:00Z","end":"2024-03-15T10:00:00Z"}]}'"#,
        );

        let events = source(path, DEFAULT_FETCH_TIMEOUT).fetch(&range()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id(), "a");
    }

    #[tokio::test]
    async fn test_fetch_maps_error_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            &dir,
            r#"echo '{"status":"error","error":"token revoked","kind":"auth_expired"}'; exit 1"#,
        );

        let err = source(path, DEFAULT_FETCH_TIMEOUT).fetch(&range()).await.unwrap_err();
        assert_eq!(err, SourceError::AuthExpired("token revoked".into()));
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "sleep 5");

        let err = source(path, Duration::from_millis(200)).fetch(&range()).await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }

    #[test]
    fn test_missing_provider_is_not_installed() {
        let err = ProviderSource::new(
            "definitely-not-a-real-provider",
            serde_json::Map::new(),
            DEFAULT_FETCH_TIMEOUT,
        )
        .unwrap_err();
        assert!(matches!(err, DayflowError::ProviderNotInstalled(_)));
    }
}
