use std::path::PathBuf;

use anyhow::Context;
use chrono::Duration;

pub const CACHE_PATH_VAR: &str = "LEARNSTREAK_CACHE_PATH";
pub const CACHE_MAX_AGE_HOURS_VAR: &str = "LEARNSTREAK_CACHE_MAX_AGE_HOURS";

/// Client cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub cache_path: PathBuf,
    /// Cached snapshots older than this are not served. `None` serves any age.
    pub max_age: Option<Duration>,
}

impl ClientConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let cache_path = match lookup(CACHE_PATH_VAR) {
            Some(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => default_cache_path()?,
        };

        let max_age = match lookup(CACHE_MAX_AGE_HOURS_VAR) {
            None => None,
            Some(raw) => {
                let hours: i64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid {CACHE_MAX_AGE_HOURS_VAR}: {raw:?}"))?;
                anyhow::ensure!(hours > 0, "{CACHE_MAX_AGE_HOURS_VAR} must be positive");
                Some(Duration::hours(hours))
            }
        };

        Ok(Self { cache_path, max_age })
    }
}

/// `{data_dir}/learnstreak/progress-cache.db`.
fn default_cache_path() -> anyhow::Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .context("failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share")?;

    let mut path = base;
    path.push("learnstreak");
    path.push("progress-cache.db");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_and_age_are_used() {
        let config = ClientConfig::from_lookup(|key| match key {
            CACHE_PATH_VAR => Some("/tmp/ls/cache.db".to_string()),
            CACHE_MAX_AGE_HOURS_VAR => Some("48".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.cache_path, PathBuf::from("/tmp/ls/cache.db"));
        assert_eq!(config.max_age, Some(Duration::hours(48)));
    }

    #[test]
    fn bad_max_age_is_rejected() {
        let lookup = |value: &'static str| {
            move |key: &str| match key {
                CACHE_PATH_VAR => Some("/tmp/cache.db".to_string()),
                CACHE_MAX_AGE_HOURS_VAR => Some(value.to_string()),
                _ => None,
            }
        };
        assert!(ClientConfig::from_lookup(lookup("soon")).is_err());
        assert!(ClientConfig::from_lookup(lookup("0")).is_err());
    }
}
