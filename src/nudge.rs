use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::blackout::BlackoutWindow;
use crate::persist::write_atomic;

/// Nudge JSON configuration. Unknown keys are dropped on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NudgeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_features: Option<OptionalFeatures>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version_requirements: Option<Vec<OsVersionRequirement>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_experience: Option<UserExperience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_interface: Option<UserInterface>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<NudgeMetadata>,
}

/// Automation-only block; Nudge itself ignores it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NudgeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blackout_periods: Option<Vec<BlackoutPeriod>>,
    /// Notice text with one `{}` placeholder for the deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_template: Option<String>,
}

/// `start` and `end` are `MM/DD`, both inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlackoutPeriod {
    pub start: String,
    pub end: String,
    pub comment: String,
}

impl NudgeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading nudge config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid nudge config {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).context("failed decoding nudge config json")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the parts the updater relies on before any decision is made.
    pub fn validate(&self) -> Result<()> {
        if self.primary_requirement().is_none() {
            bail!("osVersionRequirements must contain at least one entry");
        }
        self.blackout_windows()?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_pretty_json()?)
            .with_context(|| format!("failed writing nudge config {}", path.display()))
    }

    /// Four-space indented JSON, null fields omitted.
    pub fn to_pretty_json(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)
            .context("failed encoding nudge config")?;
        Ok(buf)
    }

    pub fn primary_requirement(&self) -> Option<&OsVersionRequirement> {
        self.os_version_requirements.as_ref()?.first()
    }

    pub fn primary_requirement_mut(&mut self) -> Option<&mut OsVersionRequirement> {
        self.os_version_requirements.as_mut()?.first_mut()
    }

    pub fn required_minimum_os_version(&self) -> Option<&str> {
        self.primary_requirement()?
            .required_minimum_os_version
            .as_deref()
    }

    pub fn required_installation_date(&self) -> Option<&str> {
        self.primary_requirement()?
            .required_installation_date
            .as_deref()
    }

    pub fn note_template(&self) -> Option<&str> {
        self.metadata.as_ref()?.note_template.as_deref()
    }

    pub fn main_content_note(&self) -> Option<&str> {
        self.user_interface
            .as_ref()?
            .update_elements
            .as_ref()?
            .first()?
            .main_content_note
            .as_deref()
    }

    pub fn blackout_windows(&self) -> Result<Vec<BlackoutWindow>> {
        let periods = self
            .metadata
            .as_ref()
            .and_then(|meta| meta.blackout_periods.as_deref())
            .unwrap_or_default();

        periods
            .iter()
            .enumerate()
            .map(|(idx, period)| {
                BlackoutWindow::parse(&period.start, &period.end, &period.comment)
                    .with_context(|| format!("metadata.blackout_periods[{}]", idx))
            })
            .collect()
    }

    /// Writes the enforcement fields of the first requirement and the
    /// first update element's note.
    pub fn apply_enforcement(&mut self, version: &str, deadline: &str, notice: String) -> Result<()> {
        let note = self
            .user_interface
            .as_mut()
            .and_then(|ui| ui.update_elements.as_mut())
            .and_then(|elements| elements.first_mut())
            .context("userInterface.updateElements must contain at least one entry")?;
        note.main_content_note = Some(notice);

        let requirement = self
            .primary_requirement_mut()
            .context("osVersionRequirements must contain at least one entry")?;
        requirement.required_minimum_os_version = Some(version.to_string());
        requirement.required_installation_date = Some(deadline.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionalFeatures {
    #[serde(rename = "acceptableApplicationBundleIDs", default, skip_serializing_if = "Option::is_none")]
    pub acceptable_application_bundle_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptable_assertion_application_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptable_assertion_usage: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptable_camera_usage: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptable_update_preparing_usage: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptable_screen_sharing_usage: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggressive_user_experience: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggressive_user_full_screen_experience: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asynchronous_software_update: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_to_block_application_launches: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_to_check_for_supported_device: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_to_fetch_major_upgrade: Option<bool>,
    #[serde(rename = "blockedApplicationBundleIDs", default, skip_serializing_if = "Option::is_none")]
    pub blocked_application_bundle_ids: Option<Vec<String>>,
    #[serde(rename = "customSOFAFeedURL", default, skip_serializing_if = "Option::is_none")]
    pub custom_sofa_feed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_nudge_for_standard_installs: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_software_update_workflow: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce_minor_updates: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub honor_focus_modes: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub honor_cycle_timers_on_exit: Option<bool>,
    #[serde(rename = "refreshSOFAFeedTime", default, skip_serializing_if = "Option::is_none")]
    pub refresh_sofa_feed_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminate_applications_on_launch: Option<bool>,
    #[serde(rename = "utilizeSOFAFeed", default, skip_serializing_if = "Option::is_none")]
    pub utilize_sofa_feed: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AboutUpdateUrl {
    #[serde(rename = "_language", default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(rename = "aboutUpdateURL", default, skip_serializing_if = "Option::is_none")]
    pub about_update_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsupportedUrl {
    #[serde(rename = "_language", default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(rename = "unsupportedURL", default, skip_serializing_if = "Option::is_none")]
    pub unsupported_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsVersionRequirement {
    #[serde(rename = "aboutUpdateURL", default, skip_serializing_if = "Option::is_none")]
    pub about_update_url: Option<String>,
    #[serde(rename = "aboutUpdateURLs", default, skip_serializing_if = "Option::is_none")]
    pub about_update_urls: Option<Vec<AboutUpdateUrl>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_button_path: Option<String>,
    #[serde(rename = "activelyExploitedCVEsMajorUpgradeSLA", default, skip_serializing_if = "Option::is_none")]
    pub actively_exploited_cves_major_upgrade_sla: Option<i64>,
    #[serde(rename = "activelyExploitedCVEsMinorUpdateSLA", default, skip_serializing_if = "Option::is_none")]
    pub actively_exploited_cves_minor_update_sla: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major_upgrade_app_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minor_version_recalculation_threshold: Option<i64>,
    #[serde(rename = "nonActivelyExploitedCVEsMajorUpgradeSLA", default, skip_serializing_if = "Option::is_none")]
    pub non_actively_exploited_cves_major_upgrade_sla: Option<i64>,
    #[serde(rename = "nonActivelyExploitedCVEsMinorUpdateSLA", default, skip_serializing_if = "Option::is_none")]
    pub non_actively_exploited_cves_minor_update_sla: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_installation_date: Option<String>,
    #[serde(rename = "requiredMinimumOSVersion", default, skip_serializing_if = "Option::is_none")]
    pub required_minimum_os_version: Option<String>,
    #[serde(rename = "standardMajorUpgradeSLA", default, skip_serializing_if = "Option::is_none")]
    pub standard_major_upgrade_sla: Option<i64>,
    #[serde(rename = "standardMinorUpdateSLA", default, skip_serializing_if = "Option::is_none")]
    pub standard_minor_update_sla: Option<i64>,
    #[serde(rename = "targetedOSVersionsRule", default, skip_serializing_if = "Option::is_none")]
    pub targeted_os_versions_rule: Option<String>,
    #[serde(rename = "unsupportedURL", default, skip_serializing_if = "Option::is_none")]
    pub unsupported_url: Option<String>,
    #[serde(rename = "unsupportedURLs", default, skip_serializing_if = "Option::is_none")]
    pub unsupported_urls: Option<Vec<UnsupportedUrl>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserExperience {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_grace_periods: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_later_deferral_button: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_movable_window: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_user_quit_deferrals: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_deferrals: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_deferrals_until_forced_secondary_quit_button: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approaching_refresh_cycle: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approaching_window_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_deferral_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_refresh_cycle: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_install_delay: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_launch_delay: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imminent_refresh_cycle: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imminent_window_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_refresh_cycle: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_agent_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_launch_agent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_random_delay_in_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_timers: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nudge_major_upgrade_event_launch_delay: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nudge_minor_update_event_launch_delay: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nudge_refresh_cycle: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_delay: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateElement {
    #[serde(rename = "_language", default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_button_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_button_text_unsupported: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_terminated_title_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_terminated_body_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_deferral_button_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_deferral_dropdown_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub information_button_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_content_header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_content_header_unsupported: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_content_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_content_note_unsupported: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_content_sub_header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_content_sub_header_unsupported: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_content_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_content_text_unsupported: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_header_unsupported: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_day_deferral_button_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_hour_deferral_button_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_quit_button_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_shot_alt_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_quit_button_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_header_unsupported: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInterface {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_button_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_terminated_notification_image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_fallback_language: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_screen_shot_icon: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_dark_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_light_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_installation_display_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_shot_dark_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_shot_light_path: Option<String>,
    #[serde(rename = "showActivelyExploitedCVEs", default, skip_serializing_if = "Option::is_none")]
    pub show_actively_exploited_cves: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_deferral_count: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_days_remaining_to_update: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_required_date: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simple_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_quit_button: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_elements: Option<Vec<UpdateElement>>,
}
