//! # avbus
//!
//! A single-threaded reactive event bus for instrument software:
//! - Topic-keyed publish/subscribe with retained values
//! - Chainable consumer filters (rate limiting, rounding, change detection)
//! - Cross-bus synchronization with resync on attach
//! - User settings kept consistent across buses by last-writer-wins
//!
//! ## Architecture
//!
//! avbus is organized as a workspace with multiple crates:
//!
//! 1. **avbus-core** - Event bus, subscriptions, subjects, consumers, sync hub
//! 2. **avbus-settings** - User settings, save slots, configuration files
//! 3. **avbus** - Logging setup, tokio host scheduler and the demo binary

pub mod runtime;

pub use avbus_core;
pub use avbus_settings;

pub use avbus_core::{
    Clock, ComputedSubject, Consumer, ConsumerSubscription, EventBus, EventBusConfig,
    EventBusError, Handler, ManualClock, ManualScheduler, MappedSubject, PublishOptions,
    Scheduler, Subject, Subscribable, SubscribeOptions, Subscription, SyncHub, SystemClock, Topic,
};

pub use avbus_settings::{
    AppConfig, DefaultUserSettingManager, JsonFileStore, KeyValueStore, MemoryStore,
    SettingValue, SettingsConfig, SettingsError, UserSetting, UserSettingDefinition,
    UserSettingManager, UserSettingSaveManager,
};

pub use runtime::TokioScheduler;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
