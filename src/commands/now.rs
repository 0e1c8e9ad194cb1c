use anyhow::Result;
use chrono::Utc;
use dayflow_core::{AnySource, DateRange, DayflowConfig, EventSource};

use crate::render::render_event_line;
use crate::utils::tui;

/// Classify the events around now without writing anything.
pub async fn run() -> Result<()> {
    let config = DayflowConfig::load()?;
    let tz = config.timezone()?;
    let source = AnySource::from_config(&config)?;
    let matcher = config.matcher();

    let now = Utc::now();
    let range = DateRange::around(now, &tz, config.days_back, config.days_ahead);

    let spinner = tui::create_spinner(format!("Fetching from {}", source.describe()), false);
    let result = source.fetch(&range).await;
    spinner.finish_and_clear();

    let events: Vec<_> = result?.into_iter().filter(|e| !e.is_cancelled()).collect();

    let classified = matcher.classify(&events, now);

    println!("{}", render_event_line("Current", classified.current, &tz));
    println!("{}", render_event_line("Upcoming", classified.upcoming, &tz));
    println!("{}", render_event_line("Recently ended", classified.recently_ended, &tz));

    Ok(())
}
