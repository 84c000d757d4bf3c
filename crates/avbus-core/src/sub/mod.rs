//! Subscription primitives shared by the bus and by value cells.
//!
//! - [`Handler`]: a shared callback with reference identity
//! - [`Subscription`] / [`HandlerSubscription`]: pause/resume/destroy handles
//! - [`Subject`]: an observable value with equality-gated notification
//! - [`MappedSubject`] / [`ComputedSubject`]: values derived from other subscribables

mod handler;
mod mapped;
mod subject;
mod subscription;

pub(crate) use handler::invoke_isolated;
pub use handler::Handler;
pub use mapped::{ComputedSubject, MappedSubject};
pub use subject::{MutableSubscribable, Subject, Subscribable};
pub(crate) use subscription::{InitialValueFn, OnDestroyFn};
pub use subscription::{HandlerSubscription, Subscription, SubscriptionState};
