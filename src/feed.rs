use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// macOS SOFA feed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MacSofaFeed {
    /// SHA-256 of the last time the feed data changed.
    pub update_hash: String,
    /// Newest OS line first.
    #[serde(rename = "OSVersions")]
    pub os_versions: Vec<OsVersion>,
    pub x_protect_payloads: XProtectPayloads,
    pub x_protect_plist_config_data: XProtectPlistConfigData,
    pub models: BTreeMap<String, Model>,
    pub installation_apps: InstallationApps,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OsVersion {
    #[serde(rename = "OSVersion")]
    pub os_version: String,
    pub latest: Latest,
    /// Every tracked release for this line, most recent first.
    pub security_releases: Vec<SecurityRelease>,
    pub supported_models: Vec<SupportedModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Latest {
    pub product_version: String,
    pub build: String,
    pub release_date: String,
    pub expiration_date: String,
    pub supported_devices: Vec<String>,
    #[serde(rename = "CVEs")]
    pub cves: BTreeMap<String, bool>,
    #[serde(rename = "ActivelyExploitedCVEs")]
    pub actively_exploited_cves: Vec<String>,
    #[serde(rename = "UniqueCVEsCount")]
    pub unique_cves_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityRelease {
    pub update_name: String,
    pub product_version: String,
    pub release_date: String,
    pub release_type: String,
    pub security_info: String,
    #[serde(default)]
    pub supported_devices: Option<Vec<String>>,
    #[serde(rename = "CVEs")]
    pub cves: BTreeMap<String, bool>,
    #[serde(rename = "ActivelyExploitedCVEs")]
    pub actively_exploited_cves: Vec<String>,
    #[serde(rename = "UniqueCVEsCount")]
    pub unique_cves_count: i64,
    pub days_since_previous_release: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SupportedModel {
    pub model: String,
    #[serde(rename = "URL")]
    pub url: String,
    pub identifiers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XProtectPayloads {
    #[serde(rename = "com.apple.XProtectFramework.XProtect")]
    pub xprotect_framework: String,
    #[serde(rename = "com.apple.XprotectFramework.PluginService")]
    pub plugin_service: String,
    #[serde(rename = "ReleaseDate")]
    pub release_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XProtectPlistConfigData {
    #[serde(rename = "com.apple.XProtect")]
    pub xprotect: String,
    #[serde(rename = "ReleaseDate")]
    pub release_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Model {
    pub marketing_name: String,
    #[serde(rename = "SupportedOS")]
    pub supported_os: Vec<String>,
    #[serde(rename = "OSVersions")]
    pub os_versions: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Uma {
    pub title: String,
    pub version: String,
    pub build: String,
    pub apple_slug: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationApps {
    #[serde(rename = "LatestUMA")]
    pub latest_uma: Uma,
    #[serde(rename = "AllPreviousUMA")]
    pub all_previous_uma: Vec<Uma>,
}

/// The two facts the update policy needs from a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseMetadata {
    pub revision_hash: String,
    pub latest_version: String,
    pub actively_exploited_cves: Vec<String>,
}

impl ReleaseMetadata {
    pub fn has_active_exploit(&self) -> bool {
        !self.actively_exploited_cves.is_empty()
    }
}

impl MacSofaFeed {
    /// Decodes and validates a feed body.
    pub fn parse(raw: &str) -> Result<Self> {
        let feed: Self = serde_json::from_str(raw).context("feed body is not a valid SOFA feed")?;
        feed.validate()?;
        Ok(feed)
    }

    pub fn validate(&self) -> Result<()> {
        if self.os_versions.is_empty() {
            bail!("feed lists no OSVersions");
        }
        for os in &self.os_versions {
            if os.security_releases.is_empty() {
                bail!("OSVersion '{}' has no SecurityReleases", os.os_version);
            }
            if os.latest.supported_devices.is_empty() {
                bail!(
                    "OSVersion '{}' latest release lists no SupportedDevices",
                    os.os_version
                );
            }
        }
        Ok(())
    }

    pub fn release_metadata(&self) -> Result<ReleaseMetadata> {
        let current = self
            .os_versions
            .first()
            .context("feed lists no OSVersions")?;
        let newest_security = current.security_releases.first().with_context(|| {
            format!("OSVersion '{}' has no SecurityReleases", current.os_version)
        })?;

        Ok(ReleaseMetadata {
            revision_hash: self.update_hash.clone(),
            latest_version: current.latest.product_version.clone(),
            actively_exploited_cves: newest_security.actively_exploited_cves.clone(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::MacSofaFeed;
    use serde_json::{json, Value};

    pub(crate) fn sample_feed(hash: &str, version: &str, exploited: &[&str]) -> Value {
        json!({
            "UpdateHash": hash,
            "OSVersions": [
                {
                    "OSVersion": "Sequoia 15",
                    "Latest": {
                        "ProductVersion": version,
                        "Build": "24D60",
                        "ReleaseDate": "2025-02-10T00:00:00Z",
                        "ExpirationDate": "2025-05-11T00:00:00Z",
                        "SupportedDevices": ["J413AP"],
                        "CVEs": {"CVE-2025-24085": true},
                        "ActivelyExploitedCVEs": exploited,
                        "UniqueCVEsCount": 1
                    },
                    "SecurityReleases": [
                        {
                            "UpdateName": format!("macOS Sequoia {}", version),
                            "ProductVersion": version,
                            "ReleaseDate": "2025-02-10T00:00:00Z",
                            "ReleaseType": "OS",
                            "SecurityInfo": "https://support.apple.com/122174",
                            "CVEs": {"CVE-2025-24085": true},
                            "ActivelyExploitedCVEs": exploited,
                            "UniqueCVEsCount": 1,
                            "DaysSincePreviousRelease": 14
                        }
                    ],
                    "SupportedModels": [
                        {
                            "Model": "MacBook Air",
                            "URL": "https://support.apple.com/120282",
                            "Identifiers": {"MacBook Air (M2, 2022)": "Mac14,2"}
                        }
                    ]
                }
            ],
            "XProtectPayloads": {
                "com.apple.XProtectFramework.XProtect": "5287",
                "com.apple.XprotectFramework.PluginService": "151",
                "ReleaseDate": "2025-02-11T18:18:44Z"
            },
            "XProtectPlistConfigData": {
                "com.apple.XProtect": "5287",
                "ReleaseDate": "2025-02-11T18:18:44Z"
            },
            "Models": {
                "Mac14,2": {
                    "MarketingName": "MacBook Air (M2, 2022)",
                    "SupportedOS": ["macOS Sequoia 15"],
                    "OSVersions": [15]
                }
            },
            "InstallationApps": {
                "LatestUMA": {
                    "title": "macOS Sequoia",
                    "version": "15.3.1",
                    "build": "24D70",
                    "apple_slug": "072-69802",
                    "url": "https://swcdn.apple.com/InstallAssistant.pkg"
                },
                "AllPreviousUMA": []
            }
        })
    }

    #[test]
    fn parse_extracts_release_metadata() {
        let raw = sample_feed("abc123", "15.3.1", &["CVE-2025-24085"]).to_string();
        let feed = MacSofaFeed::parse(&raw).expect("parse feed");
        let meta = feed.release_metadata().expect("metadata");
        assert_eq!(meta.revision_hash, "abc123");
        assert_eq!(meta.latest_version, "15.3.1");
        assert!(meta.has_active_exploit());
    }

    #[test]
    fn empty_exploit_list_means_no_active_exploit() {
        let raw = sample_feed("abc123", "15.3.1", &[]).to_string();
        let meta = MacSofaFeed::parse(&raw)
            .expect("parse feed")
            .release_metadata()
            .expect("metadata");
        assert!(!meta.has_active_exploit());
    }

    #[test]
    fn parse_rejects_missing_required_fields() {
        let mut value = sample_feed("abc123", "15.3.1", &[]);
        value
            .as_object_mut()
            .expect("object")
            .remove("UpdateHash");
        assert!(MacSofaFeed::parse(&value.to_string()).is_err());
    }

    #[test]
    fn parse_rejects_empty_security_releases() {
        let mut value = sample_feed("abc123", "15.3.1", &[]);
        value["OSVersions"][0]["SecurityReleases"] = json!([]);
        let err = MacSofaFeed::parse(&value.to_string()).expect_err("should fail");
        assert!(err.to_string().contains("SecurityReleases"));
    }

    #[test]
    fn parse_rejects_empty_os_versions() {
        let mut value = sample_feed("abc123", "15.3.1", &[]);
        value["OSVersions"] = json!([]);
        assert!(MacSofaFeed::parse(&value.to_string()).is_err());
    }

    #[test]
    fn parse_rejects_non_json_body() {
        assert!(MacSofaFeed::parse("<html>502 Bad Gateway</html>").is_err());
    }
}
