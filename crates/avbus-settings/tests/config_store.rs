use std::rc::Rc;
use std::sync::Arc;

use avbus_core::{EventBus, SystemClock};
use avbus_settings::{
    AppConfig, DefaultUserSettingManager, JsonFileStore, KeyValueStore, SettingValue,
    UserSettingDefinition, UserSettingManager, UserSettingSaveManager,
};
use tempfile::TempDir;

#[test]
fn test_config_driven_settings_persist_to_file() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("avbus.toml");

    let mut config = AppConfig::new();
    config.settings.store_path = Some(dir.path().join("datastore.json"));
    config.settings.sync_topic_prefix = "sync.".to_string();
    config.save_to_file(&config_path).unwrap();
    let config = AppConfig::load_from_file(&config_path).unwrap();

    let bus = EventBus::with_config(config.bus.clone(), Rc::new(SystemClock));
    let manager = DefaultUserSettingManager::with_config(
        &bus,
        vec![UserSettingDefinition::new("display.brightness", 0.8)],
        config.settings.clone(),
    );
    assert_eq!(
        manager.sync_topic("display.brightness").unwrap().name(),
        "sync.display.brightness"
    );

    let store_path = config.settings.resolved_store_path().unwrap();
    let store = Arc::new(JsonFileStore::open(&store_path).unwrap());
    let mut saves = UserSettingSaveManager::with_prefix(
        &bus,
        manager.all_settings(),
        store.clone(),
        config.settings.datastore_prefix.clone(),
    );
    saves.start_auto_save("cockpit").unwrap();
    manager
        .get_setting("display.brightness")
        .unwrap()
        .set(SettingValue::from(0.5));

    let reopened = JsonFileStore::open(&store_path).unwrap();
    assert_eq!(
        reopened
            .get("persistent-setting.cockpit.display.brightness")
            .unwrap(),
        Some(serde_json::json!(0.5))
    );
}
