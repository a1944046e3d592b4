use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const ENV_FILE_ENV: &str = "AUTO_NUDGE_ENV_FILE";

pub const DEFAULT_FEED_URL: &str = "https://sofafeed.macadmins.io/v1/macos_data_feed.json";
pub const DEFAULT_NUDGE_CONFIG_PATH: &str = "./v1/nudge_config.json";
pub const DEFAULT_CACHE_PATH: &str = ".auto_nudge_cache.json";

/// Where run results are reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CiEnvironment {
    Local,
    GithubActions { env_file: PathBuf },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub feed_url: String,
    pub nudge_config_path: PathBuf,
    pub cache_path: PathBuf,
    pub force_update: bool,
    pub request_timeout_secs: u64,
    pub feed_max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
    pub ci: CiEnvironment,
    /// `GITHUB_ACTIONS` was set but `GITHUB_ENV` was not.
    pub ci_env_file_missing: bool,
}

#[derive(Debug, Clone)]
pub struct DoctorReport {
    pub feed_url: String,
    pub nudge_config_path: PathBuf,
    pub nudge_config_present: bool,
    pub cache_path: PathBuf,
    pub cache_present: bool,
    pub force_update: bool,
    pub request_timeout_secs: u64,
    pub feed_max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
    pub ci: String,
    pub warnings: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            nudge_config_path: PathBuf::from(DEFAULT_NUDGE_CONFIG_PATH),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            force_update: false,
            request_timeout_secs: 30,
            feed_max_attempts: 3,
            retry_backoff_ms: 1000,
            retry_max_backoff_ms: 8000,
            ci: CiEnvironment::Local,
            ci_env_file_missing: false,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        load_dotenv()?;
        let defaults = Self::default();

        let feed_url = read_non_empty_env("MACOS_SOFA_FEED_URL").unwrap_or(defaults.feed_url);
        let nudge_config_path = read_non_empty_env("NUDGE_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.nudge_config_path);
        let cache_path = read_non_empty_env("AUTO_NUDGE_CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_path);
        let force_update = read_bool_env("NUDGE_FORCE_UPDATE", false);

        let request_timeout_secs = read_u64_env(
            "AUTO_NUDGE_REQUEST_TIMEOUT_SECS",
            defaults.request_timeout_secs,
        );
        let feed_max_attempts =
            read_u32_env("AUTO_NUDGE_FEED_MAX_ATTEMPTS", defaults.feed_max_attempts).max(1);
        let retry_backoff_ms =
            read_u64_env("AUTO_NUDGE_RETRY_BACKOFF_MS", defaults.retry_backoff_ms);
        let retry_max_backoff_ms = read_u64_env(
            "AUTO_NUDGE_RETRY_MAX_BACKOFF_MS",
            defaults.retry_max_backoff_ms,
        );

        let in_github_actions = read_non_empty_env("GITHUB_ACTIONS").is_some();
        let github_env = read_non_empty_env("GITHUB_ENV");
        let (ci, ci_env_file_missing) = match (in_github_actions, github_env) {
            (true, Some(path)) => (
                CiEnvironment::GithubActions {
                    env_file: PathBuf::from(path),
                },
                false,
            ),
            (true, None) => (CiEnvironment::Local, true),
            (false, _) => (CiEnvironment::Local, false),
        };

        Ok(Self {
            feed_url,
            nudge_config_path,
            cache_path,
            force_update,
            request_timeout_secs,
            feed_max_attempts,
            retry_backoff_ms,
            retry_max_backoff_ms,
            ci,
            ci_env_file_missing,
        })
    }

    pub fn doctor_report(&self) -> DoctorReport {
        let nudge_config_present = self.nudge_config_path.is_file();
        let mut warnings = Vec::new();

        if !nudge_config_present {
            warnings.push(format!(
                "Nudge config not found at {} (set NUDGE_CONFIG_PATH)",
                self.nudge_config_path.display()
            ));
        }
        if !self.feed_url.contains("://") {
            warnings.push(format!(
                "MACOS_SOFA_FEED_URL '{}' has no scheme",
                self.feed_url
            ));
        }
        if self.request_timeout_secs == 0 {
            warnings.push("AUTO_NUDGE_REQUEST_TIMEOUT_SECS should be > 0".to_string());
        }
        if self.retry_max_backoff_ms < self.retry_backoff_ms {
            warnings.push(
                "AUTO_NUDGE_RETRY_MAX_BACKOFF_MS should be >= AUTO_NUDGE_RETRY_BACKOFF_MS"
                    .to_string(),
            );
        }
        if self.ci_env_file_missing {
            warnings.push(
                "GITHUB_ACTIONS is set but GITHUB_ENV is missing; results will be printed instead"
                    .to_string(),
            );
        }
        if self.force_update {
            warnings.push(
                "NUDGE_FORCE_UPDATE is enabled; cache and blackout checks will be bypassed"
                    .to_string(),
            );
        }

        let ci = match &self.ci {
            CiEnvironment::Local => "local".to_string(),
            CiEnvironment::GithubActions { env_file } => {
                format!("github-actions ({})", env_file.display())
            }
        };

        DoctorReport {
            feed_url: self.feed_url.clone(),
            nudge_config_path: self.nudge_config_path.clone(),
            nudge_config_present,
            cache_path: self.cache_path.clone(),
            cache_present: self.cache_path.is_file(),
            force_update: self.force_update,
            request_timeout_secs: self.request_timeout_secs,
            feed_max_attempts: self.feed_max_attempts,
            retry_backoff_ms: self.retry_backoff_ms,
            retry_max_backoff_ms: self.retry_max_backoff_ms,
            ci,
            warnings,
        }
    }
}

fn read_non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn read_u64_env(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn read_u32_env(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn read_bool_env(key: &str, default: bool) -> bool {
    let Some(value) = env::var(key).ok() else {
        return default;
    };
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn load_dotenv() -> Result<()> {
    if let Ok(path) = env::var(ENV_FILE_ENV) {
        if !path.trim().is_empty() {
            dotenvy::from_path(path.trim())
                .with_context(|| format!("failed loading {} from {}", ENV_FILE_ENV, path.trim()))?;
            return Ok(());
        }
    }

    if Path::new(".env").exists() {
        dotenvy::from_path(".env").context("failed loading .env from current directory")?;
    }

    Ok(())
}
