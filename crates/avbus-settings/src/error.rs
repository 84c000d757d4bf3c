//! Error types for the settings crate.
//!
//! This module provides structured error types for setting lookup, save
//! slot persistence, and configuration files.

use std::io;
use thiserror::Error;

/// Errors that can occur during settings operations.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// No setting with this name is managed.
    #[error("Could not find setting with name {0}")]
    UnknownSetting(String),

    /// The save manager was destroyed.
    #[error("Cannot {operation} using a destroyed save manager")]
    ManagerDestroyed { operation: &'static str },

    /// A setting value is invalid.
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    /// A configuration error occurred.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A persistence error occurred.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Errors related to configuration files and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file format is not supported.
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// A configuration value is out of valid range.
    #[error("Value out of range for '{key}': {value}")]
    ValueOutOfRange { key: String, value: String },

    /// The configuration file is corrupted or malformed.
    #[error("Corrupted configuration: {0}")]
    Corrupted(String),

    /// Platform is not supported for config directory resolution.
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// I/O error while reading or writing the file.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

/// Errors related to the key/value store behind save slots.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// A stored value could not be read back as a setting value.
    #[error("Invalid stored value for '{key}': {reason}")]
    InvalidStoredValue { key: String, reason: String },

    /// I/O error during persistence.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON error during persistence.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_error_display() {
        let err = SettingsError::UnknownSetting("units.distance".to_string());
        assert_eq!(
            err.to_string(),
            "Could not find setting with name units.distance"
        );

        let err = SettingsError::ManagerDestroyed { operation: "load" };
        assert_eq!(err.to_string(), "Cannot load using a destroyed save manager");

        let err = SettingsError::InvalidSetting {
            key: "map.range".to_string(),
            reason: "must be positive".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid setting 'map.range': must be positive");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::UnsupportedFormat("yaml".to_string());
        assert_eq!(err.to_string(), "Unsupported config format: yaml");

        let err = ConfigError::ValueOutOfRange {
            key: "bus.sync_frame_ms".to_string(),
            value: "0".to_string(),
        };
        assert_eq!(err.to_string(), "Value out of range for 'bus.sync_frame_ms': 0");
    }

    #[test]
    fn test_persistence_error_display() {
        let err = PersistenceError::InvalidStoredValue {
            key: "persistent-setting.a.b".to_string(),
            reason: "expected bool, number or string".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid stored value for 'persistent-setting.a.b': expected bool, number or string"
        );
    }

    #[test]
    fn test_error_conversion() {
        let config_err = ConfigError::Corrupted("truncated".to_string());
        let settings_err: SettingsError = config_err.into();
        assert!(matches!(settings_err, SettingsError::Config(_)));

        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let persistence_err: PersistenceError = io_err.into();
        let settings_err: SettingsError = persistence_err.into();
        assert!(matches!(settings_err, SettingsError::Persistence(_)));
    }
}
