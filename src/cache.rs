use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::persist::write_atomic;

/// Last feed revision the updater processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoNudgeCache {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub last_update_hash: String,
}

impl AutoNudgeCache {
    pub fn new(last_update_hash: impl Into<String>) -> Self {
        Self {
            last_update_hash: last_update_hash.into(),
        }
    }

    /// Never fails: a missing, unreadable or corrupt cache is a fresh one.
    pub fn load(path: &Path) -> Self {
        if !path.is_file() {
            info!(path = %path.display(), "no cache present, starting fresh");
            return Self::default();
        }

        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cache unreadable, starting fresh");
                return Self::default();
            }
        };

        match serde_json::from_str::<Self>(&raw) {
            Ok(cache) => {
                info!(
                    path = %path.display(),
                    last_update_hash = %cache.last_update_hash,
                    "cache loaded"
                );
                cache
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cache corrupt, starting fresh");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let payload = serde_json::to_vec(self).context("failed encoding cache")?;
        write_atomic(path, &payload)
            .with_context(|| format!("failed writing cache {}", path.display()))
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::AutoNudgeCache;
    use std::fs;

    #[test]
    fn missing_file_yields_empty_hash() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = AutoNudgeCache::load(&temp.path().join("absent.json"));
        assert_eq!(cache.last_update_hash, "");
    }

    #[test]
    fn empty_or_corrupt_file_yields_empty_hash() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("cache.json");

        fs::write(&path, "").expect("write empty");
        assert_eq!(AutoNudgeCache::load(&path), AutoNudgeCache::default());

        fs::write(&path, "{not json").expect("write corrupt");
        assert_eq!(AutoNudgeCache::load(&path), AutoNudgeCache::default());

        fs::write(&path, "[1,2,3]").expect("write wrong shape");
        assert_eq!(AutoNudgeCache::load(&path), AutoNudgeCache::default());
    }

    #[test]
    fn null_or_absent_hash_reads_as_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("cache.json");

        fs::write(&path, r#"{"last_update_hash":null}"#).expect("write");
        assert_eq!(AutoNudgeCache::load(&path).last_update_hash, "");

        fs::write(&path, "{}").expect("write");
        assert_eq!(AutoNudgeCache::load(&path).last_update_hash, "");
    }

    #[test]
    fn save_writes_compact_json_that_loads_back() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("cache.json");

        AutoNudgeCache::new("xyz").save(&path).expect("save");
        assert_eq!(
            fs::read_to_string(&path).expect("read"),
            r#"{"last_update_hash":"xyz"}"#
        );
        assert_eq!(AutoNudgeCache::load(&path).last_update_hash, "xyz");
    }
}
