//! Save slots for user settings.
//!
//! A [`UserSettingSaveManager`] writes the values of a group of settings to
//! a [`KeyValueStore`] under named save keys, reads them back, and can keep
//! one or more save keys up to date automatically as settings change.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use avbus_core::{ConsumerSubscription, EventBus, Subscription, Topic};

use crate::error::{PersistenceError, SettingsError, SettingsResult};
use crate::persistence::KeyValueStore;
use crate::setting::UserSetting;
use crate::value::SettingValue;

pub const DEFAULT_DATASTORE_PREFIX: &str = "persistent-setting";

struct SaveEntry {
    setting: UserSetting,
    subscription: ConsumerSubscription<SettingValue>,
    /// Store keys this setting is auto-saved to
    auto_save_keys: Rc<RefCell<Vec<String>>>,
}

/// Saves, loads and auto-saves a group of settings
pub struct UserSettingSaveManager {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
    entries: Vec<SaveEntry>,
    auto_save_keys: Vec<String>,
    alive: bool,
}

impl UserSettingSaveManager {
    pub fn new(bus: &EventBus, settings: Vec<UserSetting>, store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_prefix(bus, settings, store, DEFAULT_DATASTORE_PREFIX)
    }

    pub fn with_prefix(
        bus: &EventBus,
        settings: Vec<UserSetting>,
        store: Arc<dyn KeyValueStore>,
        prefix: impl Into<String>,
    ) -> Self {
        let subscriber = bus.subscriber();
        let entries = settings
            .into_iter()
            .map(|setting| {
                let auto_save_keys = Rc::new(RefCell::new(Vec::<String>::new()));
                let keys = auto_save_keys.clone();
                let target = store.clone();
                let name = setting.name().to_string();
                let subscription = subscriber
                    .on(&Topic::<SettingValue>::dynamic(setting.name().to_string()))
                    .when_changed()
                    .handle_paused(move |value: &SettingValue| {
                        for key in keys.borrow().iter() {
                            if let Err(e) = write_value(target.as_ref(), key, value) {
                                tracing::warn!(setting = %name, key = %key, error = %e, "auto-save failed");
                            }
                        }
                    });
                SaveEntry {
                    setting,
                    subscription,
                    auto_save_keys,
                }
            })
            .collect();

        Self {
            store,
            prefix: prefix.into(),
            entries,
            auto_save_keys: Vec::new(),
            alive: true,
        }
    }

    /// The store key for one setting in one save slot
    pub fn datastore_key(&self, setting: &UserSetting, save_key: &str) -> String {
        format!("{}.{}.{}", self.prefix, save_key, setting.name())
    }

    /// Apply every value saved under `save_key`. Settings with no saved
    /// value keep their current value.
    pub fn load(&self, save_key: &str) -> SettingsResult<()> {
        self.ensure_alive("load")?;
        for entry in &self.entries {
            let key = self.datastore_key(&entry.setting, save_key);
            if let Some(stored) = self.store.get(&key)? {
                let value: SettingValue =
                    serde_json::from_value(stored).map_err(|e| PersistenceError::InvalidStoredValue {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?;
                entry.setting.set(value);
            }
        }
        tracing::debug!(save_key, settings = self.entries.len(), "settings loaded");
        Ok(())
    }

    /// Write every current value under `save_key`
    pub fn save(&self, save_key: &str) -> SettingsResult<()> {
        self.ensure_alive("save")?;
        for entry in &self.entries {
            let key = self.datastore_key(&entry.setting, save_key);
            write_value(self.store.as_ref(), &key, &entry.setting.value())?;
        }
        tracing::debug!(save_key, settings = self.entries.len(), "settings saved");
        Ok(())
    }

    /// Keep `save_key` updated whenever a setting changes
    pub fn start_auto_save(&mut self, save_key: &str) -> SettingsResult<()> {
        self.ensure_alive("start auto-save")?;
        if self.auto_save_keys.iter().any(|k| k == save_key) {
            return Ok(());
        }
        self.auto_save_keys.push(save_key.to_string());

        for entry in &self.entries {
            let key = self.datastore_key(&entry.setting, save_key);
            let first = {
                let mut keys = entry.auto_save_keys.borrow_mut();
                keys.push(key);
                keys.len() == 1
            };
            if first {
                entry.subscription.resume(false);
            }
        }
        Ok(())
    }

    /// Stop keeping `save_key` updated
    pub fn stop_auto_save(&mut self, save_key: &str) -> SettingsResult<()> {
        self.ensure_alive("stop auto-save")?;
        let Some(index) = self.auto_save_keys.iter().position(|k| k == save_key) else {
            return Ok(());
        };
        self.auto_save_keys.remove(index);

        for entry in &self.entries {
            let key = self.datastore_key(&entry.setting, save_key);
            let now_empty = {
                let mut keys = entry.auto_save_keys.borrow_mut();
                keys.retain(|k| *k != key);
                keys.is_empty()
            };
            if now_empty {
                entry.subscription.pause();
            }
        }
        Ok(())
    }

    /// Save keys currently being auto-saved
    pub fn auto_save_keys(&self) -> &[String] {
        &self.auto_save_keys
    }

    /// Stop all auto-saves. Every later operation fails.
    pub fn destroy(&mut self) {
        for entry in self.entries.drain(..) {
            entry.subscription.destroy();
        }
        self.auto_save_keys.clear();
        self.alive = false;
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    fn ensure_alive(&self, operation: &'static str) -> SettingsResult<()> {
        if self.alive {
            Ok(())
        } else {
            Err(SettingsError::ManagerDestroyed { operation })
        }
    }
}

fn write_value(store: &dyn KeyValueStore, key: &str, value: &SettingValue) -> SettingsResult<()> {
    let json = serde_json::to_value(value).map_err(PersistenceError::from)?;
    store.set(key, json)?;
    Ok(())
}

impl Drop for UserSettingSaveManager {
    fn drop(&mut self) {
        if self.alive {
            self.destroy();
        }
    }
}

impl std::fmt::Debug for UserSettingSaveManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSettingSaveManager")
            .field("prefix", &self.prefix)
            .field("settings", &self.entries.len())
            .field("auto_save_keys", &self.auto_save_keys)
            .field("alive", &self.alive)
            .finish()
    }
}
