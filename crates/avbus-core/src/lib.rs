//! # avbus Core
//!
//! Core runtime for avbus: a topic-keyed, single-threaded publish/subscribe
//! bus with chainable consumer filters, subscribable value cells, and a
//! sync hub that keeps several bus instances eventually consistent.

pub mod error;
pub mod event_bus;
pub mod sub;
pub mod time;
pub mod types;

pub use error::EventBusError;

// Re-export event bus for convenience
pub use event_bus::{
    BusControl, BusId, BusSync, Consumer, ConsumerSubscription, EventBus, EventBusConfig,
    EventSubscriber, FilterStage, NumericPayload, PublishOptions, SubscribeOptions, SyncEvent,
    SyncHub, SyncPackage, Topic, TopicEvent, WeakEventBus, EVENT_BUS_TOPIC, FIRST_SUB_TOPIC,
};

pub use sub::{
    ComputedSubject, Handler, HandlerSubscription, MappedSubject, MutableSubscribable, Subject,
    Subscribable, Subscription, SubscriptionState,
};

pub use time::{Clock, ManualClock, ManualScheduler, Scheduler, SystemClock};

pub use types::{
    shared, thread_safe_rw_map, Shared, SharedPayload, SharedVec, Task, ThreadSafeRwMap,
};
