//! Key/value stores for saved settings.
//!
//! Save slots address values by namespaced string keys. [`MemoryStore`]
//! keeps them in memory; [`JsonFileStore`] writes them to a single JSON
//! document in the user's config directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use avbus_core::{thread_safe_rw_map, ThreadSafeRwMap};
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{ConfigError, PersistenceResult};

/// An opaque string-keyed value store
pub trait KeyValueStore {
    /// The value stored under `key`, if any
    fn get(&self, key: &str) -> PersistenceResult<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: Value) -> PersistenceResult<()>;

    /// Remove `key`. Returns whether it existed.
    fn remove(&self, key: &str) -> PersistenceResult<bool>;
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: ThreadSafeRwMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            values: thread_safe_rw_map(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> PersistenceResult<Option<Value>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> PersistenceResult<()> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> PersistenceResult<bool> {
        Ok(self.values.write().remove(key).is_some())
    }
}

/// Store backed by a JSON file.
///
/// The whole document is read on open and rewritten on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };
        tracing::debug!(path = %path.display(), entries = values.len(), "datastore opened");
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Open the store at the default location
    pub fn open_default() -> crate::error::SettingsResult<Self> {
        Ok(Self::open(default_store_path()?)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, values: &BTreeMap<String, Value>) -> PersistenceResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(values)?)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> PersistenceResult<Option<Value>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> PersistenceResult<()> {
        let mut values = self.values.lock();
        if values.get(key) == Some(&value) {
            return Ok(());
        }
        let previous = values.insert(key.to_string(), value);
        if let Err(e) = self.write(&values) {
            // Memory must keep matching the file
            match previous {
                Some(old) => values.insert(key.to_string(), old),
                None => values.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> PersistenceResult<bool> {
        let mut values = self.values.lock();
        let Some(previous) = values.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = self.write(&values) {
            values.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(true)
    }
}

/// `<config dir>/avbus/datastore.json`
pub fn default_store_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("avbus").join("datastore.json"))
        .ok_or_else(|| ConfigError::UnsupportedPlatform(std::env::consts::OS.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        store.set("a", json!(1)).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(json!(1)));
        assert_eq!(store.get("b").unwrap(), None);
        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
    }

    #[test]
    fn test_memory_store_clones_share_values() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.set("k", json!("v")).unwrap();
        assert_eq!(other.get("k").unwrap(), Some(json!("v")));
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn test_json_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("datastore.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.set("persistent-setting.slot.units", json!("nm")).unwrap();
        store.set("persistent-setting.slot.range", json!(20.0)).unwrap();
        assert!(path.exists());

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("persistent-setting.slot.units").unwrap(),
            Some(json!("nm"))
        );
        assert!(reopened.remove("persistent-setting.slot.range").unwrap());

        let again = JsonFileStore::open(&path).unwrap();
        assert_eq!(again.get("persistent-setting.slot.range").unwrap(), None);
    }

    #[test]
    fn test_json_file_store_rejects_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("datastore.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(JsonFileStore::open(&path).is_err());
    }

    #[test]
    fn test_failed_write_leaves_memory_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("datastore.json");
        let store = JsonFileStore::open(&path).unwrap();
        store.set("slot.range", json!(10.0)).unwrap();

        // A directory in place of the file makes every write fail
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(store.set("slot.range", json!(40.0)).is_err());
        assert!(store.set("slot.units", json!("km")).is_err());
        assert!(store.remove("slot.range").is_err());

        assert_eq!(store.get("slot.range").unwrap(), Some(json!(10.0)));
        assert_eq!(store.get("slot.units").unwrap(), None);
    }

    #[test]
    fn test_default_store_path() {
        if let Ok(path) = default_store_path() {
            assert!(path.ends_with("avbus/datastore.json"));
        }
    }
}
