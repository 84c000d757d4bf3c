//! Subscription handles.
//!
//! Every registration on a bus, subject or consumer hands back a
//! [`Subscription`]. It starts alive (active or paused) and ends destroyed;
//! destruction is terminal and idempotent.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::handler::Handler;

/// Lifecycle of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Receiving notifications.
    Active,
    /// Alive, but notifications are suppressed.
    Paused,
    /// Terminal; never notified again.
    Destroyed,
}

/// A live registration that can be paused, resumed and destroyed.
pub trait Subscription {
    /// Whether the subscription has not been destroyed
    fn is_alive(&self) -> bool;

    /// Whether the subscription is currently paused
    fn is_paused(&self) -> bool;

    /// Whether a retained value is currently available for an initial
    /// notification
    fn can_initial_notify(&self) -> bool;

    /// Suppress notifications until resumed. Idempotent.
    fn pause(&self);

    /// Resume notifications. With `initial_notify`, the retained value (if
    /// any) is delivered once immediately.
    fn resume(&self, initial_notify: bool);

    /// Stop notifications permanently. Calling again is a no-op.
    fn destroy(&self);
}

/// Produces the retained value for initial notifications, if one exists.
pub(crate) type InitialValueFn<A> = Box<dyn Fn() -> Option<Rc<A>>>;

/// Called once when the subscription is destroyed.
pub(crate) type OnDestroyFn<A> = Box<dyn FnOnce(&HandlerSubscription<A>)>;

struct Inner<A: ?Sized + 'static> {
    handler: Handler<A>,
    state: Cell<SubscriptionState>,
    initial_value: Option<InitialValueFn<A>>,
    on_destroy: RefCell<Option<OnDestroyFn<A>>>,
}

/// A subscription that invokes a [`Handler`] directly.
///
/// Clones refer to the same registration.
pub struct HandlerSubscription<A: ?Sized + 'static> {
    inner: Rc<Inner<A>>,
}

impl<A: ?Sized + 'static> HandlerSubscription<A> {
    pub(crate) fn new(
        handler: Handler<A>,
        initial_value: Option<InitialValueFn<A>>,
        on_destroy: Option<OnDestroyFn<A>>,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                handler,
                state: Cell::new(SubscriptionState::Active),
                initial_value,
                on_destroy: RefCell::new(on_destroy),
            }),
        }
    }

    /// The handler this subscription invokes
    pub fn handler(&self) -> &Handler<A> {
        &self.inner.handler
    }

    /// Current lifecycle state
    pub fn state(&self) -> SubscriptionState {
        self.inner.state.get()
    }

    /// Whether two handles refer to the same registration
    pub fn same_as(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Deliver a value if the subscription is active.
    pub(crate) fn notify(&self, value: &A) {
        if self.state() != SubscriptionState::Active {
            return;
        }
        self.inner.handler.call(value);
    }

    /// Deliver the retained value, if any, to an active subscription.
    pub(crate) fn initial_notify(&self) {
        if self.state() != SubscriptionState::Active {
            return;
        }
        if let Some(value) = self.inner.initial_value.as_ref().and_then(|f| f()) {
            self.notify(&*value);
        }
    }
}

impl<A: ?Sized + 'static> Subscription for HandlerSubscription<A> {
    fn is_alive(&self) -> bool {
        self.state() != SubscriptionState::Destroyed
    }

    fn is_paused(&self) -> bool {
        self.state() == SubscriptionState::Paused
    }

    fn can_initial_notify(&self) -> bool {
        self.inner
            .initial_value
            .as_ref()
            .is_some_and(|f| f().is_some())
    }

    fn pause(&self) {
        match self.state() {
            SubscriptionState::Active => self.inner.state.set(SubscriptionState::Paused),
            SubscriptionState::Paused => {}
            SubscriptionState::Destroyed => {
                tracing::warn!("cannot pause a destroyed subscription");
            }
        }
    }

    fn resume(&self, initial_notify: bool) {
        match self.state() {
            SubscriptionState::Paused => {
                self.inner.state.set(SubscriptionState::Active);
                if initial_notify {
                    self.initial_notify();
                }
            }
            SubscriptionState::Active => {}
            SubscriptionState::Destroyed => {
                tracing::warn!("cannot resume a destroyed subscription");
            }
        }
    }

    fn destroy(&self) {
        if self.state() == SubscriptionState::Destroyed {
            return;
        }
        self.inner.state.set(SubscriptionState::Destroyed);
        let on_destroy = self.inner.on_destroy.borrow_mut().take();
        if let Some(on_destroy) = on_destroy {
            on_destroy(self);
        }
    }
}

impl<A: ?Sized + 'static> Clone for HandlerSubscription<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: ?Sized + 'static> std::fmt::Debug for HandlerSubscription<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSubscription")
            .field("state", &self.state())
            .field("handler", &self.inner.handler)
            .finish()
    }
}
