//! Terminal rendering for dayflow types.
//!
//! Extension traits that add colored output to dayflow-core types using
//! owo_colors.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use dayflow_core::{CalendarEvent, NotePath, Placement, SyncMode, SyncRun, SyncStatus};
use owo_colors::OwoColorize;

/// Extension trait for TUI rendering with colors.
pub trait Render {
    fn render(&self) -> String;
}

impl Render for Placement {
    fn render(&self) -> String {
        match self {
            Placement::Created => "+".green().to_string(),
            Placement::Skipped => "=".dimmed().to_string(),
        }
    }
}

impl Render for SyncMode {
    fn render(&self) -> String {
        match self {
            SyncMode::Continuous => "continuous".green().to_string(),
            SyncMode::Manual => "manual".to_string(),
        }
    }
}

impl Render for SyncRun {
    fn render(&self) -> String {
        let mut lines = Vec::new();

        let elapsed = self.duration().to_std().unwrap_or_default();
        let elapsed = std::time::Duration::from_millis(elapsed.as_millis() as u64);
        let mut summary = format!(
            "Synced {} {} in {}: {} created, {} already present",
            self.events_fetched,
            pluralize("event", self.events_fetched),
            humantime::format_duration(elapsed),
            self.events_written,
            self.events_skipped
        );
        if self.summaries_written > 0 {
            summary.push_str(&format!(
                ", {} daily {}",
                self.summaries_written,
                if self.summaries_written == 1 { "summary" } else { "summaries" }
            ));
        }
        if self.has_errors() {
            summary.push_str(&format!(", {}", format!("{} failed", self.errors.len()).red()));
        }
        lines.push(summary);

        for error in &self.errors {
            lines.push(format!("   {} {}", "!".red(), error.to_string().red()));
        }

        match &self.current {
            Some(title) => lines.push(format!("Current meeting: {}", title.bold())),
            None => lines.push("No meeting in progress".dimmed().to_string()),
        }

        if self.interrupted {
            lines.push("Interrupted before all events were placed".yellow().to_string());
        }

        lines.join("\n")
    }
}

/// One placed event: `+ Standup  Calendar Events/2024/03/15/0900 - Standup.md`
pub fn render_placement(title: &str, path: &NotePath, placement: Placement) -> String {
    let title = match placement {
        Placement::Created => title.green().to_string(),
        Placement::Skipped => title.dimmed().to_string(),
    };
    format!("   {} {} {}", placement.render(), title, path.to_string().dimmed())
}

pub fn render_status(status: &SyncStatus, mode: SyncMode, now: DateTime<Utc>) -> String {
    let mut lines = vec![format!("{}", "Sync status".bold())];

    let last = match (status.last_sync_at, status.time_since_last_sync(now)) {
        (Some(at), Some(ago)) => format!("{} ({} ago)", at.format("%Y-%m-%d %H:%M UTC"), humanize(ago)),
        _ => "never".dimmed().to_string(),
    };
    lines.push(format!("  Last sync:  {last}"));
    lines.push(format!("  Mode:       {}", mode.render()));
    if let Some(minutes) = status.interval_minutes {
        lines.push(format!("  Interval:   every {minutes} min"));
    }
    lines.push(format!("  Syncs:      {}", status.total_sync_count));

    let errors = status.total_error_count.to_string();
    lines.push(format!(
        "  Errors:     {}",
        if status.total_error_count > 0 { errors.red().to_string() } else { errors }
    ));
    if let Some(error) = &status.last_error {
        lines.push(format!("  Last error: {}", error.red()));
    }

    lines.join("\n")
}

pub fn render_event_line(label: &str, event: Option<&CalendarEvent>, tz: &Tz) -> String {
    let label = format!("{label:<15}");
    match event {
        Some(event) => {
            let time = if event.is_all_day() {
                "all day".to_string()
            } else {
                format!(
                    "{} - {}",
                    event.local_start(tz).format("%H:%M"),
                    event.end().with_timezone(tz).format("%H:%M")
                )
            };
            format!("{} {} {}", label.bold(), event.to_string(), time.dimmed())
        }
        None => format!("{} {}", label.bold(), "none".dimmed()),
    }
}

/// Whole minutes, formatted like `1h 5m`.
fn humanize(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0) as u64;
    let rounded = std::time::Duration::from_secs(secs - secs % 60);
    if rounded.is_zero() {
        return "less than a minute".to_string();
    }
    humantime::format_duration(rounded).to_string()
}

fn pluralize(word: &str, count: usize) -> String {
    if count == 1 { word.to_string() } else { format!("{word}s") }
}
