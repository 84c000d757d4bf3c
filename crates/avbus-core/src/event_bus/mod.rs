//! # Event Bus Module
//!
//! Topic-keyed publish/subscribe for decoupled components.
//!
//! ## Overview
//!
//! - [`EventBus`] dispatches payloads synchronously, in subscription order
//! - [`Consumer`] chains filter stages in front of a handler
//! - [`SyncHub`] keeps several buses eventually consistent
//!
//! ## Usage
//!
//! ```rust,ignore
//! use avbus_core::event_bus::{EventBus, PublishOptions, Topic};
//!
//! const ALTITUDE: Topic<f64> = Topic::new("altitude");
//!
//! let bus = EventBus::new();
//! let sub = bus
//!     .subscriber()
//!     .on(&ALTITUDE)
//!     .at_frequency(4.0, true)
//!     .with_precision(0)
//!     .handle(|alt| println!("altitude {alt}"));
//!
//! bus.publish_with(&ALTITUDE, 1234.5, PublishOptions::default().with_cache(true));
//! sub.destroy();
//! ```

mod bus;
mod consumer;
mod filters;
mod sync;
mod topic;

pub use bus::*;
pub use consumer::*;
pub use filters::*;
pub use sync::*;
pub use topic::*;
