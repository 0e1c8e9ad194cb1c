use anyhow::Result;
use chrono::Utc;
use dayflow_core::DayflowConfig;
use owo_colors::OwoColorize;

use crate::render::render_status;

pub fn run() -> Result<()> {
    let config = DayflowConfig::load()?;
    let status_store = config.status_store()?;

    let status = status_store.load();
    let mode = status_store.mode();

    println!("{}", render_status(&status, mode, Utc::now()));
    println!("\n{}", format!("Status file: {}", status_store.path().display()).dimmed());
    Ok(())
}
