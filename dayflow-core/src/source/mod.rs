//! Calendar event sources.

pub mod ics;
pub mod protocol;
pub mod provider;

use std::future::Future;

use crate::config::{DayflowConfig, SourceConfig};
use crate::date_range::DateRange;
use crate::error::{DayflowError, DayflowResult, SourceError};
use crate::event::CalendarEvent;

pub use ics::IcsFileSource;
pub use provider::ProviderSource;

/// Anything that can list the events in a date range.
pub trait EventSource: Send + Sync {
    /// Short human-readable label, e.g. `provider 'google'`.
    fn describe(&self) -> String;

    fn fetch(
        &self,
        range: &DateRange,
    ) -> impl Future<Output = Result<Vec<CalendarEvent>, SourceError>> + Send;
}

/// The configured source.
#[derive(Debug, Clone)]
pub enum AnySource {
    Provider(ProviderSource),
    Ics(IcsFileSource),
}

impl AnySource {
    pub fn from_config(config: &DayflowConfig) -> DayflowResult<Self> {
        let tz = config.timezone()?;
        match &config.source {
            SourceConfig {
                ics: Some(path), ..
            } => Ok(AnySource::Ics(IcsFileSource::new(config.expand_path(path), tz))),
            SourceConfig {
                provider: Some(name),
                params,
                ..
            } => Ok(AnySource::Provider(ProviderSource::new(
                name,
                params.clone(),
                config.fetch_timeout(),
            )?)),
            _ => Err(DayflowError::Config(
                "No calendar source configured. Set `provider` or `ics` under [source]".into(),
            )),
        }
    }
}

impl EventSource for AnySource {
    fn describe(&self) -> String {
        match self {
            AnySource::Provider(p) => p.describe(),
            AnySource::Ics(i) => i.describe(),
        }
    }

    async fn fetch(&self, range: &DateRange) -> Result<Vec<CalendarEvent>, SourceError> {
        match self {
            AnySource::Provider(p) => p.fetch(range).await,
            AnySource::Ics(i) => i.fetch(range).await,
        }
    }
}
