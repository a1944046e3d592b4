use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, instrument, warn};

use crate::blackout::{active_window, BlackoutWindow};
use crate::cache::AutoNudgeCache;
use crate::config::Settings;
use crate::fetch::{CurlFeedSource, FeedSource};
use crate::nudge::NudgeConfig;
use crate::policy::{compute_deadline, format_deadline, needs_update, render_notice};
use crate::signal;

/// Result of a run that got past both short-circuits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub revision_hash: String,
    pub config_updated: bool,
    pub targeted_version: Option<String>,
    pub deadline: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Feed revision already processed. Nothing was written.
    CacheHit { revision_hash: String },
    /// Inside a blackout window. Nothing was written, so the same revision
    /// is evaluated again on the next run.
    Blackout {
        revision_hash: String,
        reason: String,
    },
    Completed(RunReport),
}

pub struct AutoNudge {
    settings: Settings,
    feed: Box<dyn FeedSource>,
}

impl AutoNudge {
    pub fn new(settings: Settings) -> Self {
        let feed = Box::new(CurlFeedSource::from_settings(&settings));
        Self { settings, feed }
    }

    pub fn with_feed_source(settings: Settings, feed: Box<dyn FeedSource>) -> Self {
        Self { settings, feed }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn execute(&self) -> Result<RunOutcome> {
        self.run(Utc::now())
    }

    /// One pass: cache, feed, short-circuits, decision, mutation,
    /// persistence, signalling. Files are only written once every
    /// decision has succeeded.
    #[instrument(
        name = "auto_nudge.run",
        skip(self),
        fields(force = self.settings.force_update)
    )]
    pub fn run(&self, now: DateTime<Utc>) -> Result<RunOutcome> {
        let settings = &self.settings;
        let force = settings.force_update;

        let mut cache = AutoNudgeCache::load(&settings.cache_path);

        info!(url = self.feed.location(), "retrieving SOFA feed");
        let feed = self.feed.fetch()?;
        let release = feed
            .release_metadata()
            .with_context(|| format!("invalid SOFA feed from {}", self.feed.location()))?;

        if cache.last_update_hash == release.revision_hash && !force {
            info!(
                revision_hash = %release.revision_hash,
                "nudge config already targets current SOFA feed release, exiting"
            );
            return Ok(RunOutcome::CacheHit {
                revision_hash: release.revision_hash,
            });
        }
        info!(revision_hash = %release.revision_hash, "new SOFA feed release detected");

        info!(path = %settings.nudge_config_path.display(), "retrieving nudge configuration");
        let mut config = NudgeConfig::load(&settings.nudge_config_path)?;

        let windows = config
            .blackout_windows()
            .with_context(|| format!("invalid nudge config {}", settings.nudge_config_path.display()))?;
        if let Some(window) = active_window(&windows, now.date_naive()) {
            if !force {
                info!(reason = %window.reason, "currently within blackout period, exiting");
                return Ok(RunOutcome::Blackout {
                    revision_hash: release.revision_hash,
                    reason: window.reason.clone(),
                });
            }
            warn!(reason = %window.reason, "within blackout period but update is forced");
        } else {
            info!("outside blackout period, safe to proceed");
        }

        cache.last_update_hash = release.revision_hash.clone();

        let enforced = config.required_minimum_os_version().unwrap_or_default();
        let config_updated = needs_update(enforced, &release.latest_version) || force;
        if config_updated {
            let deadline = compute_deadline(now, release.has_active_exploit());
            let template = config.note_template().with_context(|| {
                format!(
                    "metadata.note_template missing from {}",
                    settings.nudge_config_path.display()
                )
            })?;
            let notice = render_notice(template, deadline).with_context(|| {
                format!(
                    "failed rendering metadata.note_template from {}",
                    settings.nudge_config_path.display()
                )
            })?;
            info!(
                from = enforced,
                to = %release.latest_version,
                deadline = %format_deadline(deadline),
                actively_exploited = release.actively_exploited_cves.len(),
                "updating nudge configuration"
            );
            config
                .apply_enforcement(&release.latest_version, &format_deadline(deadline), notice)
                .with_context(|| {
                    format!(
                        "cannot update nudge config {}",
                        settings.nudge_config_path.display()
                    )
                })?;
        } else {
            info!(version = enforced, "nudge configuration already targets latest version");
        }

        info!(path = %settings.nudge_config_path.display(), "writing nudge configuration");
        config.save(&settings.nudge_config_path)?;
        info!(path = %settings.cache_path.display(), "updating cache");
        cache.save(&settings.cache_path)?;

        let report = RunReport {
            revision_hash: cache.last_update_hash,
            config_updated,
            targeted_version: config.required_minimum_os_version().map(str::to_string),
            deadline: config.required_installation_date().map(str::to_string),
        };
        signal::emit(&settings.ci, &report)?;

        Ok(RunOutcome::Completed(report))
    }

    /// Blackout window covering `date` according to the current config.
    pub fn blackout_status(&self, date: NaiveDate) -> Result<Option<BlackoutWindow>> {
        let config = NudgeConfig::load(&self.settings.nudge_config_path)?;
        let windows = config.blackout_windows()?;
        Ok(active_window(&windows, date).cloned())
    }
}
