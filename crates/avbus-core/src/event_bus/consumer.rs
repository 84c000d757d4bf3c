//! Filtered consumers.
//!
//! A [`Consumer`] is an immutable per-topic subscription builder. Each
//! combinator returns a new consumer with one more [`FilterStage`]; every
//! `handle` call realizes a fresh copy of the stage chain, so two handlers
//! never share filter state.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::bus::{EventBus, SubscribeOptions, WeakEventBus};
use super::filters::{
    AtFrequency, FilterStage, NumericPayload, OnlyAfter, WhenChanged, WhenChangedBy,
    WithPrecision,
};
use super::topic::Topic;
use crate::sub::{invoke_isolated, Handler, HandlerSubscription, Subscription};

/// Entry point for building consumers on a bus
#[derive(Clone, Debug)]
pub struct EventSubscriber {
    bus: EventBus,
}

impl EventSubscriber {
    pub(crate) fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// A consumer for `topic` with no filters
    pub fn on<P: Clone + 'static>(&self, topic: &Topic<P>) -> Consumer<P> {
        Consumer {
            bus: self.bus.clone(),
            topic: topic.clone(),
            stages: Vec::new(),
            active: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

type StageFactory<P> = Rc<dyn Fn(i64) -> Box<dyn FilterStage<P>>>;

type ActiveList<P> = Rc<RefCell<Vec<ActiveEntry<P>>>>;

/// Live bus registrations created from one handler, oldest first
struct ActiveEntry<P: 'static> {
    handler: Handler<P>,
    subs: Vec<HandlerSubscription<dyn Any>>,
}

/// A per-topic subscription builder with chained filter stages
pub struct Consumer<P: Clone + 'static> {
    bus: EventBus,
    topic: Topic<P>,
    stages: Vec<StageFactory<P>>,
    active: ActiveList<P>,
}

impl<P: Clone + 'static> Consumer<P> {
    /// The topic this consumer reads
    pub fn topic(&self) -> &Topic<P> {
        &self.topic
    }

    /// Number of filter stages in the chain
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Append a custom stage. `make` receives the current time and is called
    /// once per `handle`.
    pub fn with_stage<S, F>(&self, make: F) -> Consumer<P>
    where
        S: FilterStage<P> + 'static,
        F: Fn(i64) -> S + 'static,
    {
        let mut stages = self.stages.clone();
        stages.push(Rc::new(move |now| Box::new(make(now)) as Box<dyn FilterStage<P>>));
        Consumer {
            bus: self.bus.clone(),
            topic: self.topic.clone(),
            stages,
            active: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Forward at most `hz` events per second.
    ///
    /// # Panics
    /// If `hz` is not a positive finite number.
    pub fn at_frequency(&self, hz: f64, immediate_first: bool) -> Consumer<P> {
        assert!(
            hz.is_finite() && hz > 0.0,
            "at_frequency requires a positive frequency, got {hz}"
        );
        self.with_stage(move |now| AtFrequency::new(hz, immediate_first, now))
    }

    /// Forward only after more than `interval_ms` has passed since the last window.
    ///
    /// # Panics
    /// If `interval_ms` is negative.
    pub fn only_after(&self, interval_ms: i64) -> Consumer<P> {
        assert!(
            interval_ms >= 0,
            "only_after requires a non-negative interval, got {interval_ms}"
        );
        self.with_stage(move |now| OnlyAfter::new(interval_ms, now))
    }

    /// Forward a value only when it differs from the last forwarded one
    pub fn when_changed(&self) -> Consumer<P>
    where
        P: PartialEq,
    {
        self.with_stage(|_| WhenChanged::<P>::new())
    }

    /// Round to `precision` decimal places, forwarding changes only
    pub fn with_precision(&self, precision: i32) -> Consumer<P>
    where
        P: NumericPayload,
    {
        self.with_stage(move |_| WithPrecision::new(precision))
    }

    /// Forward when the value moved by at least `amount`.
    ///
    /// # Panics
    /// If `amount` is negative or not finite.
    pub fn when_changed_by(&self, amount: f64) -> Consumer<P>
    where
        P: NumericPayload,
    {
        assert!(
            amount.is_finite() && amount >= 0.0,
            "when_changed_by requires a non-negative amount, got {amount}"
        );
        self.with_stage(move |_| WhenChangedBy::new(amount))
    }

    /// Register a handler
    pub fn handle<F>(&self, handler: F) -> ConsumerSubscription<P>
    where
        F: Fn(&P) + 'static,
    {
        self.handle_with(&Handler::new(handler), false)
    }

    /// Register a handler in the paused state
    pub fn handle_paused<F>(&self, handler: F) -> ConsumerSubscription<P>
    where
        F: Fn(&P) + 'static,
    {
        self.handle_with(&Handler::new(handler), true)
    }

    /// Register a shared handler.
    ///
    /// The same handler may be registered any number of times; each call
    /// yields an independent subscription. [`Consumer::off`] removes them
    /// oldest first.
    pub fn handle_with(&self, handler: &Handler<P>, paused: bool) -> ConsumerSubscription<P> {
        let options = SubscribeOptions {
            paused,
            initial_notify: false,
        };

        let sub = if self.stages.is_empty() {
            let user = handler.clone();
            self.bus
                .on_with(&self.topic, move |payload: &P| user.call(payload), options)
        } else {
            let clock = self.bus.clock();
            let now = clock.now_ms();
            let chain: RefCell<Vec<Box<dyn FilterStage<P>>>> =
                RefCell::new(self.stages.iter().map(|make| make(now)).collect());
            let user = handler.clone();
            self.bus.on_with(
                &self.topic,
                move |payload: &P| {
                    let now = clock.now_ms();
                    // Chain borrow ends here; a nested publish re-enters it
                    let forwarded = chain
                        .borrow_mut()
                        .iter_mut()
                        .try_fold(payload.clone(), |value, stage| stage.process(value, now));
                    if let Some(value) = forwarded {
                        user.call(&value);
                    }
                },
                options,
            )
        };

        track(&self.active, handler, &sub);
        if !paused {
            sub.initial_notify();
        }
        // A registration that died during its own initial notify keeps no entry
        if !sub.is_alive() {
            untrack(&self.active, handler, &sub);
        }

        ConsumerSubscription {
            inner: Rc::new(ConsumerSubInner {
                sub,
                bus: self.bus.downgrade(),
                topic: self.topic.clone(),
                handler: handler.clone(),
                active: Rc::downgrade(&self.active),
            }),
        }
    }

    /// Remove the oldest live registration of `handler`.
    ///
    /// Prefer [`Subscription::destroy`] on the handle returned by `handle`.
    /// Does nothing if the handler has no live registration.
    pub fn off(&self, handler: &Handler<P>) {
        let oldest = {
            let mut active = self.active.borrow_mut();
            let Some(index) = active.iter().position(|e| e.handler.ptr_eq(handler)) else {
                return;
            };
            let oldest = active[index].subs.remove(0);
            if active[index].subs.is_empty() {
                active.remove(index);
            }
            oldest
        };
        oldest.destroy();
    }

    /// Number of live registrations tracked by this consumer
    pub fn registration_count(&self) -> usize {
        self.active.borrow().iter().map(|e| e.subs.len()).sum()
    }
}

impl<P: Clone + 'static> Clone for Consumer<P> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
            topic: self.topic.clone(),
            stages: self.stages.clone(),
            active: self.active.clone(),
        }
    }
}

impl<P: Clone + 'static> std::fmt::Debug for Consumer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("topic", &self.topic.name())
            .field("stages", &self.stages.len())
            .field("registrations", &self.registration_count())
            .finish()
    }
}

struct ConsumerSubInner<P: 'static> {
    sub: HandlerSubscription<dyn Any>,
    bus: WeakEventBus,
    topic: Topic<P>,
    handler: Handler<P>,
    active: Weak<RefCell<Vec<ActiveEntry<P>>>>,
}

/// Handle for one `Consumer::handle` registration
pub struct ConsumerSubscription<P: 'static> {
    inner: Rc<ConsumerSubInner<P>>,
}

impl<P: 'static> ConsumerSubscription<P> {
    /// The user handler this subscription delivers to
    pub fn handler(&self) -> &Handler<P> {
        &self.inner.handler
    }

    fn forget(&self) {
        if let Some(active) = self.inner.active.upgrade() {
            untrack(&active, &self.inner.handler, &self.inner.sub);
        }
    }
}

fn track<P: 'static>(
    active: &RefCell<Vec<ActiveEntry<P>>>,
    handler: &Handler<P>,
    sub: &HandlerSubscription<dyn Any>,
) {
    let mut active = active.borrow_mut();
    match active.iter_mut().find(|e| e.handler.ptr_eq(handler)) {
        Some(entry) => entry.subs.push(sub.clone()),
        None => active.push(ActiveEntry {
            handler: handler.clone(),
            subs: vec![sub.clone()],
        }),
    }
}

/// Drop one registration from the bookkeeping, removing the handler's
/// entry once it has no registrations left
fn untrack<P: 'static>(
    active: &RefCell<Vec<ActiveEntry<P>>>,
    handler: &Handler<P>,
    sub: &HandlerSubscription<dyn Any>,
) {
    let mut active = active.borrow_mut();
    if let Some(index) = active.iter().position(|e| e.handler.ptr_eq(handler)) {
        active[index].subs.retain(|s| !s.same_as(sub));
        if active[index].subs.is_empty() {
            active.remove(index);
        }
    }
}

impl<P: 'static> Subscription for ConsumerSubscription<P> {
    fn is_alive(&self) -> bool {
        self.inner.sub.is_alive()
    }

    fn is_paused(&self) -> bool {
        self.inner.sub.is_paused()
    }

    fn can_initial_notify(&self) -> bool {
        self.inner.sub.can_initial_notify()
    }

    fn pause(&self) {
        self.inner.sub.pause();
    }

    /// Resuming with `initial_notify` hands the raw retained value straight
    /// to the user handler. Filter stages neither see nor record it.
    fn resume(&self, initial_notify: bool) {
        if !self.inner.sub.is_paused() {
            self.inner.sub.resume(false);
            return;
        }
        self.inner.sub.resume(false);
        if !initial_notify {
            return;
        }
        let Some(bus) = self.inner.bus.upgrade() else {
            return;
        };
        let topic = self.inner.topic.name();
        if let Some(payload) = bus.cached_payload(topic) {
            if let Some(value) = payload.downcast_ref::<P>() {
                invoke_isolated(topic, || self.inner.handler.call(value));
            }
        }
    }

    fn destroy(&self) {
        if !self.inner.sub.is_alive() {
            return;
        }
        self.inner.sub.destroy();
        self.forget();
    }
}

impl<P: 'static> Clone for ConsumerSubscription<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: 'static> std::fmt::Debug for ConsumerSubscription<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerSubscription")
            .field("topic", &self.inner.topic.name())
            .field("state", &self.inner.sub.state())
            .finish()
    }
}
