//! User configuration at ~/.config/dayflow/config.toml
//!
//! Every setting can be overridden with a `DAYFLOW_<SETTING>` environment
//! variable, e.g. `DAYFLOW_INTERVAL_MINUTES=5`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::date_range::MAX_WINDOW_DAYS;
use crate::error::{DayflowError, DayflowResult};
use crate::matcher::{DEFAULT_RECENT_WINDOW_MINUTES, DEFAULT_UPCOMING_WINDOW_MINUTES, MeetingMatcher};
use crate::placement::{DEFAULT_EVENTS_FOLDER, FolderLayout};
use crate::status::SyncStatusStore;
use crate::summary::DEFAULT_SUMMARY_FOLDER;
use crate::tracker::DEFAULT_POINTER_FILE;

const DEFAULT_INTERVAL_MINUTES: u64 = 10;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// One week.
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;
/// One day.
pub const MAX_MEETING_WINDOW_MINUTES: i64 = 24 * 60;

fn default_events_folder() -> PathBuf {
    PathBuf::from(DEFAULT_EVENTS_FOLDER)
}

fn default_pointer_file() -> PathBuf {
    PathBuf::from(DEFAULT_POINTER_FILE)
}

fn default_interval_minutes() -> u64 {
    DEFAULT_INTERVAL_MINUTES
}

fn default_upcoming_window() -> i64 {
    DEFAULT_UPCOMING_WINDOW_MINUTES
}

fn default_recent_window() -> i64 {
    DEFAULT_RECENT_WINDOW_MINUTES
}

fn default_days() -> u32 {
    1
}

fn default_fetch_timeout() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

fn default_summary_folder() -> PathBuf {
    PathBuf::from(DEFAULT_SUMMARY_FOLDER)
}

/// Where events come from. Either `provider` (plus any provider-specific
/// keys, passed through verbatim) or `ics`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ics: Option<PathBuf>,

    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayflowConfig {
    /// Root of the note vault
    pub vault_path: Option<PathBuf>,

    /// Folder for event notes, relative to the vault root
    #[serde(default = "default_events_folder")]
    pub events_folder: PathBuf,

    #[serde(default)]
    pub folder_layout: FolderLayout,

    /// Pointer file, relative to the vault root
    #[serde(default = "default_pointer_file")]
    pub pointer_file: PathBuf,

    /// Rewrite a summary note per day with meetings after each sync
    #[serde(default = "default_true")]
    pub daily_summary: bool,

    /// Folder for daily summaries, relative to the vault root
    #[serde(default = "default_summary_folder")]
    pub daily_summary_folder: PathBuf,

    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    #[serde(default = "default_upcoming_window")]
    pub upcoming_window_minutes: i64,

    #[serde(default = "default_recent_window")]
    pub recent_window_minutes: i64,

    #[serde(default = "default_days")]
    pub days_back: u32,

    #[serde(default = "default_days")]
    pub days_ahead: u32,

    /// IANA name; the system zone when unset
    pub timezone: Option<String>,

    pub status_path: Option<PathBuf>,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    #[serde(default)]
    pub source: SourceConfig,
}

impl Default for DayflowConfig {
    fn default() -> Self {
        DayflowConfig {
            vault_path: None,
            events_folder: default_events_folder(),
            folder_layout: FolderLayout::default(),
            pointer_file: default_pointer_file(),
            daily_summary: true,
            daily_summary_folder: default_summary_folder(),
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            upcoming_window_minutes: DEFAULT_UPCOMING_WINDOW_MINUTES,
            recent_window_minutes: DEFAULT_RECENT_WINDOW_MINUTES,
            days_back: default_days(),
            days_ahead: default_days(),
            timezone: None,
            status_path: None,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            source: SourceConfig::default(),
        }
    }
}

impl DayflowConfig {
    pub fn config_path() -> DayflowResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| DayflowError::Config("Could not determine config directory".into()))?
            .join("dayflow");

        Ok(config_dir.join("config.toml"))
    }

    /// Load the user config, creating a commented default file on first use.
    pub fn load() -> DayflowResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> DayflowResult<Self> {
        let config: DayflowConfig = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("DAYFLOW").try_parsing(true))
            .build()
            .map_err(|e| DayflowError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| DayflowError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges. Called by `load_from`; call again after
    /// overriding settings from the command line.
    pub fn validate(&self) -> DayflowResult<()> {
        if !(1..=MAX_INTERVAL_MINUTES).contains(&self.interval_minutes) {
            return Err(DayflowError::Config(format!(
                "interval_minutes must be between 1 and {MAX_INTERVAL_MINUTES}"
            )));
        }
        for (name, minutes) in [
            ("upcoming_window_minutes", self.upcoming_window_minutes),
            ("recent_window_minutes", self.recent_window_minutes),
        ] {
            if !(0..=MAX_MEETING_WINDOW_MINUTES).contains(&minutes) {
                return Err(DayflowError::Config(format!(
                    "{name} must be between 0 and {MAX_MEETING_WINDOW_MINUTES}"
                )));
            }
        }
        if self.days_back > MAX_WINDOW_DAYS || self.days_ahead > MAX_WINDOW_DAYS {
            return Err(DayflowError::Config(format!(
                "days_back and days_ahead cannot exceed {MAX_WINDOW_DAYS}"
            )));
        }
        if self.source.provider.is_some() && self.source.ics.is_some() {
            return Err(DayflowError::Config(
                "[source] sets both `provider` and `ics`; pick one".into(),
            ));
        }
        Ok(())
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> DayflowResult<()> {
        let contents = format!(
            "\
# dayflow configuration

# Your note vault (required):
# vault_path = \"~/Notes\"

# Folder for meeting notes, inside the vault:
# events_folder = \"{DEFAULT_EVENTS_FOLDER}\"

# Date folders: flat, year, year/month, year/month/day or year/week
# folder_layout = \"flat\"

# Note that always points at the current meeting:
# pointer_file = \"{DEFAULT_POINTER_FILE}\"

# One summary note per day listing its meetings, rewritten on every sync:
# daily_summary = true
# daily_summary_folder = \"{DEFAULT_SUMMARY_FOLDER}\"

# Minutes between syncs in continuous mode:
# interval_minutes = {DEFAULT_INTERVAL_MINUTES}

# A meeting starting within this many minutes is \"upcoming\":
# upcoming_window_minutes = {DEFAULT_UPCOMING_WINDOW_MINUTES}

# A meeting that ended within this many minutes is \"recently ended\":
# recent_window_minutes = {DEFAULT_RECENT_WINDOW_MINUTES}

# Days fetched around today in continuous mode:
# days_back = 1
# days_ahead = 1

# Timezone for note names and times (defaults to the system zone):
# timezone = \"Europe/Berlin\"

# Seconds to wait for the calendar provider:
# fetch_timeout_secs = {DEFAULT_FETCH_TIMEOUT_SECS}

# Where events come from. Either a provider binary (dayflow-provider-<name>)
# with its own settings, or a local .ics file:
# [source]
# provider = \"google\"
# calendar_id = \"primary\"
#
# [source]
# ics = \"~/calendars/work.ics\"
"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DayflowError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| DayflowError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    pub fn expand_path(&self, path: &Path) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
    }

    /// The vault root, which must be an existing directory.
    pub fn vault_path(&self) -> DayflowResult<PathBuf> {
        let configured = self.vault_path.as_ref().ok_or_else(|| {
            DayflowError::Config(format!(
                "vault_path is not set. Add it to {}",
                Self::config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| "config.toml".into())
            ))
        })?;

        let path = self.expand_path(configured);
        if !path.is_dir() {
            return Err(DayflowError::VaultNotFound(path));
        }
        Ok(path)
    }

    pub fn timezone(&self) -> DayflowResult<Tz> {
        if let Some(name) = &self.timezone {
            return name
                .parse()
                .map_err(|_| DayflowError::Config(format!("Unknown timezone '{name}'")));
        }

        let system = iana_time_zone::get_timezone().ok().and_then(|name| name.parse().ok());
        Ok(system.unwrap_or_else(|| {
            tracing::warn!("Could not determine system timezone, using UTC");
            chrono_tz::UTC
        }))
    }

    pub fn matcher(&self) -> MeetingMatcher {
        let window = |minutes: i64| {
            chrono::Duration::try_minutes(minutes).unwrap_or(chrono::Duration::MAX)
        };
        MeetingMatcher::new(
            window(self.upcoming_window_minutes),
            window(self.recent_window_minutes),
        )
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn status_store(&self) -> DayflowResult<SyncStatusStore> {
        let path = match &self.status_path {
            Some(path) => self.expand_path(path),
            None => SyncStatusStore::default_path()?,
        };
        Ok(SyncStatusStore::new(path))
    }

    /// Resolved settings as TOML, for display.
    pub fn to_toml(&self) -> DayflowResult<String> {
        toml::to_string_pretty(self).map_err(|e| DayflowError::Config(e.to_string()))
    }
}
