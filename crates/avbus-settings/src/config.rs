//! Configuration for avbus applications
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML file formats.
//!
//! Configuration is organized into logical sections:
//! - Event bus behaviour (first-subscriber events, resync, sync frame rate)
//! - Settings (topic and datastore prefixes, datastore location)

use avbus_core::EventBusConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};
use crate::persistence::default_store_path;
use crate::save::DEFAULT_DATASTORE_PREFIX;

/// Settings layer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Prefix of the per-setting sync topics
    pub sync_topic_prefix: String,
    /// Prefix of save slot keys in the datastore
    pub datastore_prefix: String,
    /// Datastore file; defaults to the user's config directory
    pub store_path: Option<PathBuf>,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            sync_topic_prefix: "usersetting.".to_string(),
            datastore_prefix: DEFAULT_DATASTORE_PREFIX.to_string(),
            store_path: None,
        }
    }
}

impl SettingsConfig {
    /// The configured datastore path, or the platform default
    pub fn resolved_store_path(&self) -> ConfigResult<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => default_store_path(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Event bus settings
    pub bus: EventBusConfig,
    /// Settings layer
    pub settings: SettingsConfig,
}

impl AppConfig {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;

        let config: Self = match Format::of(path)? {
            Format::Json => serde_json::from_str(&content)
                .map_err(|e| ConfigError::Corrupted(format!("Invalid JSON config: {}", e)))?,
            Format::Toml => toml::from_str(&content)
                .map_err(|e| ConfigError::Corrupted(format!("Invalid TOML config: {}", e)))?,
        };

        config.validate()?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> ConfigResult<()> {
        self.validate()?;

        let content = match Format::of(path)? {
            Format::Json => serde_json::to_string_pretty(self)
                .map_err(|e| ConfigError::Corrupted(format!("Failed to serialize config: {}", e)))?,
            Format::Toml => toml::to_string_pretty(self)
                .map_err(|e| ConfigError::Corrupted(format!("Failed to serialize config: {}", e)))?,
        };

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.bus.validate().is_err() {
            return Err(ConfigError::ValueOutOfRange {
                key: "bus.sync_frame_ms".to_string(),
                value: self.bus.sync_frame_ms.to_string(),
            });
        }

        if self.settings.sync_topic_prefix.is_empty() {
            return Err(ConfigError::ValueOutOfRange {
                key: "settings.sync_topic_prefix".to_string(),
                value: String::new(),
            });
        }

        if self.settings.datastore_prefix.is_empty() || self.settings.datastore_prefix.contains('.')
        {
            return Err(ConfigError::ValueOutOfRange {
                key: "settings.datastore_prefix".to_string(),
                value: self.settings.datastore_prefix.clone(),
            });
        }

        Ok(())
    }
}

enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> ConfigResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.settings.sync_topic_prefix, "usersetting.");
        assert_eq!(config.settings.datastore_prefix, "persistent-setting");
        assert_eq!(config.bus.sync_frame_ms, 16);
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("avbus.toml");

        let mut config = AppConfig::new();
        config.bus.sync_frame_ms = 33;
        config.settings.store_path = Some(dir.path().join("store.json"));
        config.save_to_file(&path).unwrap();

        assert_eq!(AppConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("avbus.json");

        let mut config = AppConfig::new();
        config.bus.resync_on_attach = false;
        config.save_to_file(&path).unwrap();

        assert_eq!(AppConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("avbus.toml");
        std::fs::write(&path, "[bus]\nsync_frame_ms = 50\n").unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.bus.sync_frame_ms, 50);
        assert!(config.bus.publish_first_sub_events);
        assert_eq!(config.settings, SettingsConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::new();
        config.bus.sync_frame_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValueOutOfRange { .. })
        ));

        let mut config = AppConfig::new();
        config.settings.datastore_prefix = "a.b".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("avbus.yaml");
        assert!(matches!(
            AppConfig::new().save_to_file(&path),
            Err(ConfigError::UnsupportedFormat(ext)) if ext == "yaml"
        ));
    }

    #[test]
    fn test_resolved_store_path() {
        let config = SettingsConfig {
            store_path: Some(PathBuf::from("/tmp/x.json")),
            ..Default::default()
        };
        assert_eq!(
            config.resolved_store_path().unwrap(),
            PathBuf::from("/tmp/x.json")
        );
    }
}
