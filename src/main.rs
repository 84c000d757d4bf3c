use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use avbus::{
    init_logging, AppConfig, Clock, DefaultUserSettingManager, EventBus, MemoryStore,
    PublishOptions, Scheduler, SettingValue, SyncHub, SystemClock, TokioScheduler, Topic,
    UserSettingDefinition, UserSettingManager, UserSettingSaveManager, BUILD_DATE, VERSION,
};

const ALTITUDE: Topic<f64> = Topic::new("altitude");

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    tracing::info!(version = VERSION, built = BUILD_DATE, "avbus demo starting");

    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load_from_file(Path::new(&path))?,
        None => AppConfig::default(),
    };

    let local = tokio::task::LocalSet::new();
    local.run_until(run(config)).await
}

/// Two displays, each with its own bus, linked by a sync hub.
async fn run(config: AppConfig) -> anyhow::Result<()> {
    let scheduler: Rc<dyn Scheduler> = Rc::new(TokioScheduler);
    let clock: Rc<dyn Clock> = Rc::new(SystemClock);

    let pfd = EventBus::with_config(config.bus.clone(), clock.clone());
    let mfd = EventBus::with_config(config.bus.clone(), clock);

    let hub = SyncHub::new();
    hub.attach(&pfd)?;
    hub.attach(&mfd)?;
    hub.start(scheduler, config.bus.sync_frame_ms);

    let definitions = vec![
        UserSettingDefinition::new("units.altitude", "ft"),
        UserSettingDefinition::new("map.range", 10),
    ];
    let pfd_settings =
        DefaultUserSettingManager::with_config(&pfd, definitions.clone(), config.settings.clone());
    let mfd_settings =
        DefaultUserSettingManager::with_config(&mfd, definitions, config.settings.clone());

    let store = Arc::new(MemoryStore::new());
    let mut saves = UserSettingSaveManager::with_prefix(
        &mfd,
        mfd_settings.all_settings(),
        store.clone(),
        config.settings.datastore_prefix.clone(),
    );
    saves.start_auto_save("demo")?;

    let _pfd_altitude = pfd
        .subscriber()
        .on(&ALTITUDE)
        .at_frequency(4.0, true)
        .with_precision(-1)
        .handle(|alt: &f64| tracing::info!(altitude = alt, "PFD altitude"));

    let _mfd_altitude = mfd
        .subscriber()
        .on(&ALTITUDE)
        .when_changed_by(50.0)
        .handle(|alt: &f64| tracing::info!(altitude = alt, "MFD altitude"));

    let _mfd_units = mfd_settings
        .when_setting_changed("units.altitude")?
        .handle(|units: &SettingValue| tracing::info!(units = %units, "MFD altitude units"));

    let climb = PublishOptions::default().with_sync(true).with_cache(true);
    for step in 0..40 {
        pfd.publish_with(&ALTITUDE, 1000.0 + f64::from(step) * 7.3, climb);
        if step == 20 {
            pfd_settings
                .get_setting("units.altitude")?
                .set(SettingValue::from("m"));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    hub.stop();
    saves.save("last-flight")?;
    tracing::info!(entries = store.len(), "settings saved");
    Ok(())
}
