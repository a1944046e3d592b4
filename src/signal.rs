use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::CiEnvironment;
use crate::runner::RunReport;

pub const COMMIT_MSG_VAR: &str = "COMMIT_MSG";
pub const CONFIG_CHANGED_VAR: &str = "CONFIG_CHANGED";

/// Empty when the run did not change the configuration.
pub fn commit_message(report: &RunReport) -> String {
    if !report.config_updated {
        return String::new();
    }
    format!(
        "Update required_minimum_os_version to {}",
        report.targeted_version.as_deref().unwrap_or("<unset>")
    )
}

/// `KEY=value` lines for a GitHub Actions env file.
pub fn github_env_lines(report: &RunReport) -> Vec<String> {
    vec![
        format!("{}='{}'", COMMIT_MSG_VAR, commit_message(report)),
        format!(
            "{}={}",
            CONFIG_CHANGED_VAR,
            if report.config_updated { "True" } else { "False" }
        ),
    ]
}

pub fn local_summary(report: &RunReport) -> String {
    format!(
        "SOFA Feed Hash: {}\nConfig updated: {}\nTargeted version: {}\nDeadline: {}",
        report.revision_hash,
        report.config_updated,
        report.targeted_version.as_deref().unwrap_or("<unset>"),
        report.deadline.as_deref().unwrap_or("<unset>"),
    )
}

/// Publishes a completed run to the CI env file, or to stdout locally.
pub fn emit(ci: &CiEnvironment, report: &RunReport) -> Result<()> {
    match ci {
        CiEnvironment::GithubActions { env_file } => {
            info!(env_file = %env_file.display(), "github environment detected, exporting variables");
            let lines = github_env_lines(report);
            for line in &lines {
                println!("{}", line);
            }
            append_lines(env_file, &lines)
        }
        CiEnvironment::Local => {
            info!("local environment detected, printing results");
            println!();
            println!("{}", local_summary(report));
            Ok(())
        }
    }
}

fn append_lines(path: &Path, lines: &[String]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open env file {}", path.display()))?;
    for line in lines {
        writeln!(file, "{}", line)
            .with_context(|| format!("failed to append env file {}", path.display()))?;
    }
    Ok(())
}
