//! Settings managers.
//!
//! [`DefaultUserSettingManager`] owns a set of settings and keeps them in
//! step with every other manager reachable over the bus. Each setting has
//! a sync topic carrying [`SettingSync`] updates; conflicting updates are
//! resolved last-writer-wins by `sync_time`, and a received update older
//! than the last local one is dropped.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use avbus_core::{
    Consumer, ConsumerSubscription, EventBus, PublishOptions, Topic, WeakEventBus,
};

use crate::config::SettingsConfig;
use crate::error::{SettingsError, SettingsResult};
use crate::setting::UserSetting;
use crate::value::{SettingSync, SettingValue, UserSettingDefinition};

/// Read access to a set of named settings
pub trait UserSettingManager {
    /// The setting called `name`
    fn get_setting(&self, name: &str) -> SettingsResult<UserSetting>;

    /// Every managed setting
    fn all_settings(&self) -> Vec<UserSetting>;

    /// A consumer of the setting's value, forwarding changes only
    fn when_setting_changed(&self, name: &str) -> SettingsResult<Consumer<SettingValue>>;

    /// A view of this manager that resolves names through `aliases` first
    fn map_to(&self, aliases: HashMap<String, String>) -> MappedUserSettingManager;
}

/// Sync bookkeeping shared by a setting's write path and its sync handler
struct SyncState {
    sync_topic: Topic<SettingSync>,
    sync_time: Cell<i64>,
}

struct SettingEntry {
    setting: UserSetting,
    state: Rc<SyncState>,
    _sync_sub: ConsumerSubscription<SettingSync>,
}

struct ManagerInner {
    bus: EventBus,
    config: SettingsConfig,
    order: Vec<String>,
    entries: HashMap<String, SettingEntry>,
}

/// A bus-synchronized settings manager
#[derive(Clone)]
pub struct DefaultUserSettingManager {
    inner: Rc<ManagerInner>,
}

impl DefaultUserSettingManager {
    pub fn new(bus: &EventBus, definitions: Vec<UserSettingDefinition>) -> Self {
        Self::with_config(bus, definitions, SettingsConfig::default())
    }

    pub fn with_config(
        bus: &EventBus,
        definitions: Vec<UserSettingDefinition>,
        config: SettingsConfig,
    ) -> Self {
        let mut order = Vec::with_capacity(definitions.len());
        let mut entries = HashMap::with_capacity(definitions.len());

        for definition in definitions {
            let name = definition.name.clone();
            let state = Rc::new(SyncState {
                sync_topic: Topic::dynamic(format!("{}{}", config.sync_topic_prefix, name)),
                sync_time: Cell::new(0),
            });

            let weak = bus.downgrade();
            let write_state = state.clone();
            let setting = UserSetting::new(definition, move |value| {
                publish_local_change(&weak, &write_state, value);
            });

            let sync_sub = bus
                .subscriber()
                .on(&state.sync_topic)
                .handle(sync_handler(bus.downgrade(), setting.clone(), state.clone()));

            // Defaults stay local with sync time 0 so any peer value wins
            bus.publish_with(
                &Topic::<SettingValue>::dynamic(name.clone()),
                setting.value(),
                PublishOptions::default().with_cache(true),
            );

            tracing::debug!(setting = %name, "setting registered");
            order.push(name.clone());
            entries.insert(
                name,
                SettingEntry {
                    setting,
                    state,
                    _sync_sub: sync_sub,
                },
            );
        }

        Self {
            inner: Rc::new(ManagerInner {
                bus: bus.clone(),
                config,
                order,
                entries,
            }),
        }
    }

    /// The topic carrying sync updates for `name`
    pub fn sync_topic(&self, name: &str) -> SettingsResult<Topic<SettingSync>> {
        self.entry(name).map(|e| e.state.sync_topic.clone())
    }

    /// The time of the last update adopted for `name`
    pub fn last_sync_time(&self, name: &str) -> SettingsResult<i64> {
        self.entry(name).map(|e| e.state.sync_time.get())
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn config(&self) -> &SettingsConfig {
        &self.inner.config
    }

    fn entry(&self, name: &str) -> SettingsResult<&SettingEntry> {
        self.inner
            .entries
            .get(name)
            .ok_or_else(|| SettingsError::UnknownSetting(name.to_string()))
    }
}

/// Timestamp a local change and publish it for every manager, this one included
fn publish_local_change(bus: &WeakEventBus, state: &SyncState, value: &SettingValue) {
    let Some(bus) = bus.upgrade() else {
        return;
    };
    let sync_time = bus.clock().now_ms();
    state.sync_time.set(sync_time);
    bus.publish_with(
        &state.sync_topic,
        SettingSync {
            value: value.clone(),
            sync_time,
        },
        PublishOptions::default().with_sync(true).with_cache(true),
    );
}

fn sync_handler(
    bus: WeakEventBus,
    setting: UserSetting,
    state: Rc<SyncState>,
) -> impl Fn(&SettingSync) + 'static {
    let public_topic: Topic<SettingValue> = Topic::dynamic(setting.name().to_string());
    move |data: &SettingSync| {
        if data.sync_time < state.sync_time.get() {
            tracing::debug!(
                setting = %setting.name(),
                received = data.sync_time,
                last = state.sync_time.get(),
                "stale setting update discarded"
            );
            return;
        }
        state.sync_time.set(data.sync_time);
        setting.sync_value(data.value.clone());

        // Never synced: peers derive the public value from the sync topic
        if let Some(bus) = bus.upgrade() {
            bus.publish_with(
                &public_topic,
                data.value.clone(),
                PublishOptions::default().with_cache(true),
            );
        }
    }
}

impl UserSettingManager for DefaultUserSettingManager {
    fn get_setting(&self, name: &str) -> SettingsResult<UserSetting> {
        self.entry(name).map(|e| e.setting.clone())
    }

    fn all_settings(&self) -> Vec<UserSetting> {
        self.inner
            .order
            .iter()
            .filter_map(|name| self.inner.entries.get(name))
            .map(|e| e.setting.clone())
            .collect()
    }

    fn when_setting_changed(&self, name: &str) -> SettingsResult<Consumer<SettingValue>> {
        self.entry(name)?;
        Ok(self
            .inner
            .bus
            .subscriber()
            .on(&Topic::dynamic(name.to_string()))
            .when_changed())
    }

    fn map_to(&self, aliases: HashMap<String, String>) -> MappedUserSettingManager {
        MappedUserSettingManager::new(Rc::new(self.clone()), aliases)
    }
}

impl std::fmt::Debug for DefaultUserSettingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultUserSettingManager")
            .field("settings", &self.inner.order)
            .finish()
    }
}

/// A manager view that translates alias names before delegating
#[derive(Clone)]
pub struct MappedUserSettingManager {
    parent: Rc<dyn UserSettingManager>,
    aliases: Rc<HashMap<String, String>>,
}

impl MappedUserSettingManager {
    pub fn new(parent: Rc<dyn UserSettingManager>, aliases: HashMap<String, String>) -> Self {
        Self {
            parent,
            aliases: Rc::new(aliases),
        }
    }

    /// The underlying name for `name`
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map_or(name, String::as_str)
    }
}

impl UserSettingManager for MappedUserSettingManager {
    fn get_setting(&self, name: &str) -> SettingsResult<UserSetting> {
        self.parent.get_setting(self.resolve(name))
    }

    fn all_settings(&self) -> Vec<UserSetting> {
        self.parent.all_settings()
    }

    fn when_setting_changed(&self, name: &str) -> SettingsResult<Consumer<SettingValue>> {
        self.parent.when_setting_changed(self.resolve(name))
    }

    fn map_to(&self, aliases: HashMap<String, String>) -> MappedUserSettingManager {
        MappedUserSettingManager::new(Rc::new(self.clone()), aliases)
    }
}

impl std::fmt::Debug for MappedUserSettingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedUserSettingManager")
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}
