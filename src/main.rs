mod commands;
mod render;
mod utils;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dayflow_core::config::MAX_INTERVAL_MINUTES;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dayflow")]
#[command(about = "Sync calendar events into your note vault and track the current meeting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull events into the vault and update the current meeting note
    Sync {
        /// First date to sync (YYYY-MM-DD, default: yesterday)
        #[arg(long)]
        start: Option<String>,

        /// Last date to sync (YYYY-MM-DD, default: a week from today)
        #[arg(long)]
        end: Option<String>,

        /// Keep syncing every --interval minutes until interrupted
        #[arg(short, long)]
        continuous: bool,

        /// Minutes between syncs in continuous mode (default from config)
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=MAX_INTERVAL_MINUTES))]
        interval: Option<u64>,

        /// Only print errors
        #[arg(short, long)]
        quiet: bool,

        /// Show what would be written without touching the vault
        #[arg(long)]
        dry_run: bool,

        /// Skip rewriting the per-day summary notes
        #[arg(long)]
        no_daily_summary: bool,
    },
    /// Show when the last sync ran and how it went
    Status,
    /// Show the current, upcoming and recently ended meetings
    Now,
    /// Show the config file location and resolved settings
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let quiet = matches!(cli.command, Commands::Sync { quiet: true, .. });
    init_logging(quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Sync {
            start,
            end,
            continuous,
            interval,
            quiet,
            dry_run,
            no_daily_summary,
        } => {
            let args = commands::sync::SyncArgs {
                start,
                end,
                continuous,
                interval,
                quiet,
                dry_run,
                no_daily_summary,
            };
            commands::sync::run(args).await
        }
        Commands::Status => commands::status::run().map(|_| ExitCode::SUCCESS),
        Commands::Now => commands::now::run().await.map(|_| ExitCode::SUCCESS),
        Commands::Config => commands::config::run().map(|_| ExitCode::SUCCESS),
    }
}

/// `RUST_LOG` wins; otherwise warnings and up, or errors only with `--quiet`.
fn init_logging(quiet: bool) {
    let default = if quiet { "error" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
