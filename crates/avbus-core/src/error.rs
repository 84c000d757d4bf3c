//! Error handling for avbus
//!
//! Most edge cases on the bus are silent no-ops, for example publishing to
//! a topic nobody listens on or destroying a dead subscription.
//! [`EventBusError`] covers the remaining cases where a caller asked for
//! something that cannot be done.
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

use crate::event_bus::BusId;

/// Event bus error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// A sync hook is already installed on the bus
    #[error("Bus {bus} already has a sync hook installed")]
    SyncAlreadyInstalled {
        /// The bus that rejected the hook.
        bus: BusId,
    },

    /// Configuration value is out of range
    #[error("Invalid event bus configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: String,
    },
}
