use std::process::ExitCode;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::error;

use auto_nudge::config::Settings;
use auto_nudge::observability;
use auto_nudge::runner::{AutoNudge, RunOutcome};

#[derive(Parser, Debug)]
#[command(name = "auto-nudge")]
#[command(about = "Keep a Nudge configuration in sync with the SOFA macOS feed", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check the feed and update the Nudge configuration if needed.
    Run {
        /// Bypass the cache and blackout checks and rewrite the config.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Show resolved settings and configuration warnings.
    Doctor,
    /// Report whether a date falls inside a configured blackout period.
    Blackout {
        /// Date to check as YYYY-MM-DD. Defaults to today (UTC).
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
}

fn main() -> ExitCode {
    observability::init();
    match run_cli(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(1)
        }
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    let mut settings = Settings::load()?;

    match cli.command.unwrap_or(Commands::Run { force: false }) {
        Commands::Run { force } => {
            settings.force_update |= force;
            let updater = AutoNudge::new(settings);
            match updater.execute()? {
                RunOutcome::CacheHit { revision_hash } => {
                    println!("No new SOFA feed release ({}), nothing to do", revision_hash);
                }
                RunOutcome::Blackout { reason, .. } => {
                    println!("Within blackout period ({}), nothing to do", reason);
                }
                RunOutcome::Completed(_) => {}
            }
        }
        Commands::Doctor => {
            let report = settings.doctor_report();
            println!("auto-nudge Doctor");
            println!("feed_url: {}", report.feed_url);
            println!("nudge_config_path: {}", report.nudge_config_path.display());
            println!("nudge_config_present: {}", report.nudge_config_present);
            println!("cache_path: {}", report.cache_path.display());
            println!("cache_present: {}", report.cache_present);
            println!("force_update: {}", report.force_update);
            println!("request_timeout_secs: {}", report.request_timeout_secs);
            println!("feed_max_attempts: {}", report.feed_max_attempts);
            println!("retry_backoff_ms: {}", report.retry_backoff_ms);
            println!("retry_max_backoff_ms: {}", report.retry_max_backoff_ms);
            println!("ci: {}", report.ci);
            if report.warnings.is_empty() {
                println!("status: ok");
            } else {
                println!("status: warning");
                for warning in report.warnings {
                    println!("- {}", warning);
                }
            }
        }
        Commands::Blackout { date } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let updater = AutoNudge::new(settings);
            match updater.blackout_status(date)? {
                Some(window) => println!(
                    "{}: within blackout {} - {} ({})",
                    date, window.start, window.end, window.reason
                ),
                None => println!("{}: no blackout period active", date),
            }
        }
    }

    Ok(())
}

fn parse_date(value: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("invalid date (expected YYYY-MM-DD): {value}"))
}
