//! avbus Settings Crate
//!
//! User settings layered on the event bus: values synchronized between
//! managers by last-writer-wins, alias-mapped views, save slots over a
//! key/value store, and file-based application configuration.

pub mod config;
pub mod error;
pub mod manager;
pub mod persistence;
pub mod save;
pub mod setting;
pub mod value;

pub use config::{AppConfig, SettingsConfig};
pub use error::{
    ConfigError, ConfigResult, PersistenceError, PersistenceResult, SettingsError, SettingsResult,
};
pub use manager::{DefaultUserSettingManager, MappedUserSettingManager, UserSettingManager};
pub use persistence::{default_store_path, JsonFileStore, KeyValueStore, MemoryStore};
pub use save::{UserSettingSaveManager, DEFAULT_DATASTORE_PREFIX};
pub use setting::UserSetting;
pub use value::{SettingSync, SettingValue, UserSettingDefinition};
