//! Application settings
//!
//! Defaults can be overridden field-by-field by the `settings` object of a
//! JSON manifest or by a settings file passed to the CLI.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper bound for `maxRetries`; anything above this is a configuration mistake
pub const MAX_RETRIES_LIMIT: u32 = 20;

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Reload the catalog periodically
    pub auto_refresh: bool,
    /// Catalog reload interval (milliseconds)
    pub refresh_interval: u64,
    /// Same-URL retries for fatal network errors
    pub max_retries: u32,
    /// Initial output volume (0.0 - 1.0)
    pub default_volume: f64,
    /// Keep fetched manifests in memory
    pub enable_cache: bool,
    /// Manifest cache lifetime (milliseconds)
    pub cache_time: u64,
    /// Linear backoff unit for network retries (milliseconds)
    pub retry_base_delay: u64,
    /// Time a backup source gets to start playing (milliseconds)
    pub backup_grace_period: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_refresh: true,
            refresh_interval: 300_000,
            max_retries: 3,
            default_volume: 0.5,
            enable_cache: true,
            cache_time: 3_600_000,
            retry_base_delay: 1_000,
            backup_grace_period: 5_000,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, missing fields falling back to defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.as_ref().display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply a partial override (e.g. a manifest `settings` object).
    ///
    /// Only the keys present in `overrides` change; unknown keys are ignored.
    pub fn merged_with(&self, overrides: &serde_json::Value) -> Result<Self> {
        let mut base = serde_json::to_value(self)?;
        if let (Some(base), Some(overrides)) = (base.as_object_mut(), overrides.as_object()) {
            for (key, value) in overrides {
                if base.contains_key(key) {
                    base.insert(key.clone(), value.clone());
                }
            }
        }
        let merged: Settings = serde_json::from_value(base)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        merged.validate()?;
        Ok(merged)
    }

    /// Reject values that would make playback misbehave
    pub fn validate(&self) -> Result<()> {
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(Error::InvalidConfig(format!(
                "maxRetries must be at most {}, got {}",
                MAX_RETRIES_LIMIT, self.max_retries
            )));
        }
        if self.backup_grace_period == 0 {
            return Err(Error::InvalidConfig("backupGracePeriod must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.default_volume) {
            return Err(Error::InvalidConfig(format!(
                "defaultVolume must be within 0..=1, got {}",
                self.default_volume
            )));
        }
        if self.auto_refresh && self.refresh_interval == 0 {
            return Err(Error::InvalidConfig("refreshInterval must be positive".into()));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval)
    }

    pub fn cache_time(&self) -> Duration {
        Duration::from_millis(self.cache_time)
    }

    /// Derive the playback session configuration
    pub fn playback(&self) -> PlaybackConfig {
        PlaybackConfig {
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay),
            backup_grace_period: Duration::from_millis(self.backup_grace_period),
        }
    }
}

/// Playback session configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackConfig {
    /// Same-URL retries before the backup cascade takes over
    pub max_retries: u32,
    /// Linear backoff unit (`attempt * base`)
    pub retry_base_delay: Duration,
    /// Delay before a freshly loaded backup is checked for playback
    pub backup_grace_period: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Settings::default().playback()
    }
}

impl PlaybackConfig {
    /// Backoff before retry number `attempt` (1-based)
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_base_delay * attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_match_player_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.refresh_interval(), Duration::from_secs(300));
        assert_eq!(settings.cache_time(), Duration::from_secs(3600));
        assert!(settings.enable_cache);
    }

    #[test]
    fn test_partial_override() {
        let merged = Settings::default()
            .merged_with(&json!({ "maxRetries": 5, "enableCache": false, "unknown": 1 }))
            .unwrap();
        assert_eq!(merged.max_retries, 5);
        assert!(!merged.enable_cache);
        assert_eq!(merged.refresh_interval, 300_000);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let err = Settings::default()
            .merged_with(&json!({ "maxRetries": 99 }))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = Settings::default()
            .merged_with(&json!({ "defaultVolume": 1.5 }))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_linear_backoff() {
        let config = PlaybackConfig::default();
        assert_eq!(config.retry_delay(1), Duration::from_secs(1));
        assert_eq!(config.retry_delay(3), Duration::from_secs(3));
        assert_eq!(config.backup_grace_period, Duration::from_secs(5));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "maxRetries": 1, "retryBaseDelay": 250 }"#).unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.max_retries, 1);
        assert_eq!(settings.playback().retry_delay(2), Duration::from_millis(500));
        assert!(settings.auto_refresh);
    }
}
