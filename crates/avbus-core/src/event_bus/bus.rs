//! Event Bus implementation.
//!
//! Provides the core [`EventBus`]: a topic-keyed dispatch table with
//! optional retained values and a pluggable sync hook. Dispatch is
//! synchronous and single-threaded; a publish runs every handler before it
//! returns.

use serde::{Deserialize, Serialize};
use std::any::{type_name, Any};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use uuid::Uuid;

use super::consumer::EventSubscriber;
use super::sync::{BusSync, SyncEvent, SyncPackage};
use super::topic::{BusControl, Topic, EVENT_BUS_TOPIC, FIRST_SUB_TOPIC};
use crate::error::EventBusError;
use crate::sub::{
    invoke_isolated, Handler, HandlerSubscription, InitialValueFn, OnDestroyFn, Subscription,
};
use crate::time::{Clock, SystemClock};
use crate::types::SharedPayload;

/// Unique identity of a bus instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusId(Uuid);

impl BusId {
    /// Create a new unique bus ID
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for BusId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bus({})", &self.0.to_string()[..8])
    }
}

/// Configuration for the event bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Publish [`FIRST_SUB_TOPIC`] when a topic gains its first subscriber.
    pub publish_first_sub_events: bool,
    /// Ask peers for their synced cached events when a sync hook is installed.
    pub resync_on_attach: bool,
    /// Period between sync hub flushes, in milliseconds.
    pub sync_frame_ms: u64,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            publish_first_sub_events: true,
            resync_on_attach: true,
            sync_frame_ms: 16,
        }
    }
}

impl EventBusConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), EventBusError> {
        if self.sync_frame_ms == 0 {
            return Err(EventBusError::InvalidConfig {
                reason: "sync_frame_ms must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Delivery flags for one publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Forward the event to the sync hook. Never changes local delivery.
    pub sync: bool,
    /// Retain the payload for initial notification of later subscribers.
    pub cache: bool,
}

impl PublishOptions {
    /// Set the sync flag
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Set the cache flag
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }
}

/// Registration flags for one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Start paused; no initial notification is sent.
    pub paused: bool,
    /// Deliver the topic's retained value, if any, before returning.
    pub initial_notify: bool,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            paused: false,
            initial_notify: true,
        }
    }
}

/// One publish as seen by a wildcard subscriber
#[derive(Clone)]
pub struct TopicEvent {
    /// Topic the payload was published on.
    pub topic: String,
    /// The published payload.
    pub payload: SharedPayload,
}

impl TopicEvent {
    /// The payload, if it has type `P`
    pub fn payload_as<P: 'static>(&self) -> Option<&P> {
        self.payload.downcast_ref::<P>()
    }
}

impl std::fmt::Debug for TopicEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicEvent")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// A retained payload
#[derive(Clone)]
struct CachedEvent {
    payload: SharedPayload,
    synced: bool,
}

type TopicSub = HandlerSubscription<dyn Any>;

struct BusInner {
    id: BusId,
    config: EventBusConfig,
    clock: Rc<dyn Clock>,
    /// Registered handlers per topic, in registration order
    topics: RefCell<HashMap<String, Vec<TopicSub>>>,
    /// Handlers receiving every topic
    wildcards: RefCell<Vec<HandlerSubscription<TopicEvent>>>,
    /// Retained values per topic
    cache: RefCell<HashMap<String, CachedEvent>>,
    sync: RefCell<Option<Rc<dyn BusSync>>>,
    control_sub: RefCell<Option<TopicSub>>,
    last_package: Cell<Option<Uuid>>,
}

/// Topic-keyed publish/subscribe bus.
///
/// `EventBus` is a cheap handle; clones share the same dispatch table.
/// Pass it explicitly to every component that needs it.
#[derive(Clone)]
pub struct EventBus {
    inner: Rc<BusInner>,
}

/// A non-owning handle to an [`EventBus`]
#[derive(Clone)]
pub struct WeakEventBus {
    inner: Weak<BusInner>,
}

impl WeakEventBus {
    /// The bus, if it is still alive
    pub fn upgrade(&self) -> Option<EventBus> {
        self.inner.upgrade().map(|inner| EventBus { inner })
    }
}

impl EventBus {
    /// Create a new event bus with default configuration and the wall clock
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default(), Rc::new(SystemClock))
    }

    /// Create a new event bus with default configuration and a custom clock
    pub fn with_clock(clock: Rc<dyn Clock>) -> Self {
        Self::with_config(EventBusConfig::default(), clock)
    }

    /// Create a new event bus with custom configuration
    pub fn with_config(config: EventBusConfig, clock: Rc<dyn Clock>) -> Self {
        let bus = Self {
            inner: Rc::new(BusInner {
                id: BusId::new(),
                config,
                clock,
                topics: RefCell::new(HashMap::new()),
                wildcards: RefCell::new(Vec::new()),
                cache: RefCell::new(HashMap::new()),
                sync: RefCell::new(None),
                control_sub: RefCell::new(None),
                last_package: Cell::new(None),
            }),
        };
        tracing::debug!(bus = %bus.id(), "event bus created");
        bus
    }

    /// This bus's identity
    pub fn id(&self) -> BusId {
        self.inner.id
    }

    /// Get the current configuration
    pub fn config(&self) -> &EventBusConfig {
        &self.inner.config
    }

    /// The clock used by time-based filters on this bus
    pub fn clock(&self) -> Rc<dyn Clock> {
        self.inner.clock.clone()
    }

    /// A non-owning handle to this bus
    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Subscribe to a topic.
    ///
    /// If the topic has a retained value it is delivered to `handler` before
    /// this call returns.
    pub fn on<P, F>(&self, topic: &Topic<P>, handler: F) -> HandlerSubscription<dyn Any>
    where
        P: 'static,
        F: Fn(&P) + 'static,
    {
        self.on_with(topic, handler, SubscribeOptions::default())
    }

    /// Subscribe to a topic in the paused state
    pub fn on_paused<P, F>(&self, topic: &Topic<P>, handler: F) -> HandlerSubscription<dyn Any>
    where
        P: 'static,
        F: Fn(&P) + 'static,
    {
        self.on_with(
            topic,
            handler,
            SubscribeOptions {
                paused: true,
                initial_notify: false,
            },
        )
    }

    /// Subscribe to a topic with explicit options
    pub fn on_with<P, F>(
        &self,
        topic: &Topic<P>,
        handler: F,
        options: SubscribeOptions,
    ) -> HandlerSubscription<dyn Any>
    where
        P: 'static,
        F: Fn(&P) + 'static,
    {
        let name = topic.name().to_string();
        let typed = Handler::<dyn Any>::new(move |payload| match payload.downcast_ref::<P>() {
            Some(payload) => handler(payload),
            None => tracing::warn!(
                topic = %name,
                expected = type_name::<P>(),
                "payload type mismatch; delivery skipped"
            ),
        });
        self.register(topic.name(), typed, options)
    }

    fn register(
        &self,
        topic: &str,
        handler: Handler<dyn Any>,
        options: SubscribeOptions,
    ) -> TopicSub {
        let is_first = {
            let mut topics = self.inner.topics.borrow_mut();
            if topics.contains_key(topic) {
                false
            } else {
                topics.insert(topic.to_string(), Vec::new());
                true
            }
        };
        if is_first && self.inner.config.publish_first_sub_events {
            self.publish(&FIRST_SUB_TOPIC, topic.to_string());
        }

        let source = Rc::downgrade(&self.inner);
        let cached_topic = topic.to_string();
        let initial_value: InitialValueFn<dyn Any> = Box::new(move || {
            let inner = source.upgrade()?;
            let cache = inner.cache.borrow();
            cache.get(&cached_topic).map(|c| c.payload.clone())
        });

        let owner = Rc::downgrade(&self.inner);
        let owned_topic = topic.to_string();
        let on_destroy: OnDestroyFn<dyn Any> = Box::new(move |sub| {
            if let Some(inner) = owner.upgrade() {
                if let Some(subs) = inner.topics.borrow_mut().get_mut(&owned_topic) {
                    subs.retain(|s| !s.same_as(sub));
                }
                tracing::trace!(topic = %owned_topic, "subscription destroyed");
            }
        });

        let sub = HandlerSubscription::new(handler, Some(initial_value), Some(on_destroy));
        if let Some(subs) = self.inner.topics.borrow_mut().get_mut(topic) {
            subs.push(sub.clone());
        }
        tracing::trace!(topic, paused = options.paused, "subscription added");

        if options.paused {
            sub.pause();
        } else if options.initial_notify {
            sub.initial_notify();
        }
        sub
    }

    /// Subscribe to every topic.
    ///
    /// Wildcard handlers run after the topic's own handlers on each publish.
    pub fn on_all<F>(&self, handler: F) -> HandlerSubscription<TopicEvent>
    where
        F: Fn(&TopicEvent) + 'static,
    {
        let owner = Rc::downgrade(&self.inner);
        let on_destroy: OnDestroyFn<TopicEvent> = Box::new(move |sub| {
            if let Some(inner) = owner.upgrade() {
                inner.wildcards.borrow_mut().retain(|s| !s.same_as(sub));
            }
        });
        let sub = HandlerSubscription::new(Handler::new(handler), None, Some(on_destroy));
        self.inner.wildcards.borrow_mut().push(sub.clone());
        sub
    }

    /// Remove exactly one registration. Same as `subscription.destroy()`.
    pub fn off(&self, subscription: &impl Subscription) {
        subscription.destroy();
    }

    /// Publish a payload to every active handler of `topic`
    pub fn publish<P: 'static>(&self, topic: &Topic<P>, payload: P) {
        self.publish_with(topic, payload, PublishOptions::default());
    }

    /// Publish with explicit sync/cache flags
    pub fn publish_with<P: 'static>(&self, topic: &Topic<P>, payload: P, options: PublishOptions) {
        self.publish_shared(topic.name(), Rc::new(payload), options);
    }

    pub(crate) fn publish_shared(&self, topic: &str, payload: SharedPayload, options: PublishOptions) {
        if options.cache {
            self.inner.cache.borrow_mut().insert(
                topic.to_string(),
                CachedEvent {
                    payload: payload.clone(),
                    synced: options.sync,
                },
            );
        }

        // Iterate a snapshot so handlers may subscribe or unsubscribe freely
        let snapshot = self.inner.topics.borrow().get(topic).cloned();
        if let Some(subs) = snapshot {
            for sub in subs {
                if sub.is_alive() && !sub.is_paused() {
                    invoke_isolated(topic, || sub.notify(&*payload));
                }
            }
        }

        if options.sync {
            self.sync_event(topic, payload.clone(), options.cache);
        }

        let wildcards = self.inner.wildcards.borrow().clone();
        if !wildcards.is_empty() {
            let event = TopicEvent {
                topic: topic.to_string(),
                payload,
            };
            for sub in wildcards {
                if sub.is_alive() && !sub.is_paused() {
                    invoke_isolated(topic, || sub.notify(&event));
                }
            }
        }
    }

    /// Get a subscriber for building filtered consumers
    pub fn subscriber(&self) -> EventSubscriber {
        EventSubscriber::new(self.clone())
    }

    /// Number of live subscriptions for a topic
    pub fn topic_subscriber_count(&self, topic: &str) -> usize {
        self.inner.topics.borrow().get(topic).map_or(0, Vec::len)
    }

    /// The retained value of a topic, if it has one of type `P`
    pub fn cached<P: 'static>(&self, topic: &Topic<P>) -> Option<Rc<P>> {
        self.cached_payload(topic.name())
            .and_then(|payload| payload.downcast::<P>().ok())
    }

    pub(crate) fn cached_payload(&self, topic: &str) -> Option<SharedPayload> {
        self.inner.cache.borrow().get(topic).map(|c| c.payload.clone())
    }

    /// Install the hook that forwards synced events to peer buses.
    ///
    /// The bus starts answering [`BusControl::ResyncRequest`] and, when
    /// configured, asks its peers to resync.
    pub fn install_sync(&self, sync: Rc<dyn BusSync>) -> Result<(), EventBusError> {
        if self.inner.sync.borrow().is_some() {
            return Err(EventBusError::SyncAlreadyInstalled { bus: self.id() });
        }
        *self.inner.sync.borrow_mut() = Some(sync);

        let weak = self.downgrade();
        let control = self.on_with(
            &EVENT_BUS_TOPIC,
            move |message: &BusControl| {
                if *message == BusControl::ResyncRequest {
                    if let Some(bus) = weak.upgrade() {
                        bus.resync_events();
                    }
                }
            },
            SubscribeOptions {
                paused: false,
                initial_notify: false,
            },
        );
        *self.inner.control_sub.borrow_mut() = Some(control);

        if self.inner.config.resync_on_attach {
            self.sync_event(
                EVENT_BUS_TOPIC.name(),
                Rc::new(BusControl::ResyncRequest),
                false,
            );
        }
        tracing::debug!(bus = %self.id(), "sync hook installed");
        Ok(())
    }

    /// Remove the sync hook, returning it
    pub fn remove_sync(&self) -> Option<Rc<dyn BusSync>> {
        if let Some(control) = self.inner.control_sub.borrow_mut().take() {
            control.destroy();
        }
        self.inner.sync.borrow_mut().take()
    }

    /// Re-send every cached event that was published with sync
    pub fn resync_events(&self) {
        let synced: Vec<(String, SharedPayload)> = self
            .inner
            .cache
            .borrow()
            .iter()
            .filter(|(_, event)| event.synced)
            .map(|(topic, event)| (topic.clone(), event.payload.clone()))
            .collect();
        tracing::debug!(bus = %self.id(), events = synced.len(), "resyncing cached events");
        for (topic, payload) in synced {
            self.sync_event(&topic, payload, true);
        }
    }

    fn sync_event(&self, topic: &str, payload: SharedPayload, cached: bool) {
        let sync = self.inner.sync.borrow().clone();
        match sync {
            Some(sync) => sync.send_event(SyncEvent {
                topic: topic.to_string(),
                payload,
                cached,
            }),
            None => tracing::trace!(topic, "no sync hook installed; event not forwarded"),
        }
    }

    /// Apply a package of events received from a peer bus.
    ///
    /// Packages from this bus and repeats of the last package are ignored.
    /// Every event is republished locally without sync.
    pub fn receive_package(&self, package: &SyncPackage) {
        if package.bus_id == self.id() {
            return;
        }
        if self.inner.last_package.get() == Some(package.package_id) {
            tracing::trace!(bus = %self.id(), "duplicate sync package ignored");
            return;
        }
        self.inner.last_package.set(Some(package.package_id));

        for event in &package.events {
            self.publish_shared(
                &event.topic,
                event.payload.clone(),
                PublishOptions {
                    sync: false,
                    cache: event.cached,
                },
            );
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("id", &self.id())
            .field("topics", &self.inner.topics.borrow().len())
            .field("config", &self.inner.config)
            .finish()
    }
}
