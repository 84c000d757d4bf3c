//! Subscribable value cells.
//!
//! A [`Subject`] holds one value and notifies its subscribers when the value
//! changes. "Changes" is decided by an equality function: setting a value
//! equal to the current one is silent.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::handler::{invoke_isolated, Handler};
use super::mapped::MappedSubject;
use super::subscription::{HandlerSubscription, InitialValueFn, OnDestroyFn, Subscription};

/// A value that can be read and observed.
pub trait Subscribable<T: 'static> {
    /// The current value
    fn get(&self) -> T;

    /// Subscribe a shared handler. With `initial_notify`, the handler is
    /// called once with the current value unless `paused`.
    fn sub_handler(
        &self,
        handler: &Handler<T>,
        initial_notify: bool,
        paused: bool,
    ) -> HandlerSubscription<T>;

    /// Destroy the oldest live subscription of `handler`, if any.
    fn unsub(&self, handler: &Handler<T>);

    /// Subscribe a closure
    fn sub<F>(&self, f: F, initial_notify: bool) -> HandlerSubscription<T>
    where
        F: Fn(&T) + 'static,
        Self: Sized,
    {
        self.sub_handler(&Handler::new(f), initial_notify, false)
    }

    /// A subject following `f` applied to this value
    fn map<U, F>(&self, f: F) -> MappedSubject<U>
    where
        U: Clone + PartialEq + 'static,
        F: Fn(&T) -> U + 'static,
        Self: Sized,
    {
        MappedSubject::from_source(self, f, |a: &U, b: &U| a == b)
    }

    /// Like [`Subscribable::map`] with a custom equality for the mapped value
    fn map_with_equality<U, F, E>(&self, f: F, equals: E) -> MappedSubject<U>
    where
        U: Clone + 'static,
        F: Fn(&T) -> U + 'static,
        E: Fn(&U, &U) -> bool + 'static,
        Self: Sized,
    {
        MappedSubject::from_source(self, f, equals)
    }

    /// Copy this value into `to`, now and on every change. A paused pipe
    /// copies nothing until resumed.
    fn pipe<M>(&self, to: &M, paused: bool) -> HandlerSubscription<T>
    where
        T: Clone,
        M: MutableSubscribable<T> + Clone + 'static,
        Self: Sized,
    {
        let to = to.clone();
        self.sub_handler(&Handler::new(move |v: &T| to.set(v.clone())), true, paused)
    }

    /// Copy `f` applied to this value into `to`
    fn pipe_map<U, M, F>(&self, to: &M, f: F, paused: bool) -> HandlerSubscription<T>
    where
        U: 'static,
        M: MutableSubscribable<U> + Clone + 'static,
        F: Fn(&T) -> U + 'static,
        Self: Sized,
    {
        let to = to.clone();
        self.sub_handler(&Handler::new(move |v: &T| to.set(f(v))), true, paused)
    }
}

/// A [`Subscribable`] whose value can be replaced.
pub trait MutableSubscribable<T: 'static>: Subscribable<T> {
    /// Replace the value, notifying subscribers if it changed
    fn set(&self, value: T);
}

type EqualsFn<T> = Box<dyn Fn(&T, &T) -> bool>;

struct SubjectInner<T: 'static> {
    value: RefCell<T>,
    equals: EqualsFn<T>,
    subs: RefCell<Vec<HandlerSubscription<T>>>,
}

/// A single observable value.
///
/// Cloning a subject clones the handle; all clones share the value and the
/// subscriber list.
pub struct Subject<T: 'static> {
    inner: Rc<SubjectInner<T>>,
}

impl<T: Clone + PartialEq + 'static> Subject<T> {
    /// Create a subject using `PartialEq` to detect changes
    pub fn create(initial: T) -> Self {
        Self::with_equality(initial, |a: &T, b: &T| a == b)
    }
}

impl<T: Clone + 'static> Subject<T> {
    /// Create a subject with a custom equality function
    pub fn with_equality<E>(initial: T, equals: E) -> Self
    where
        E: Fn(&T, &T) -> bool + 'static,
    {
        Self {
            inner: Rc::new(SubjectInner {
                value: RefCell::new(initial),
                equals: Box::new(equals),
                subs: RefCell::new(Vec::new()),
            }),
        }
    }

    /// The current value
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Replace the value. Subscribers are notified only if the new value is
    /// not equal to the old one.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.borrow_mut();
            if (self.inner.equals)(&*current, &value) {
                return;
            }
            *current = value;
        }
        self.notify();
    }

    /// Subscribe a closure, optionally notifying it with the current value
    pub fn sub<F>(&self, f: F, initial_notify: bool) -> HandlerSubscription<T>
    where
        F: Fn(&T) + 'static,
    {
        self.sub_handler(&Handler::new(f), initial_notify, false)
    }

    /// Subscribe a closure in the paused state
    pub fn sub_paused<F>(&self, f: F) -> HandlerSubscription<T>
    where
        F: Fn(&T) + 'static,
    {
        self.sub_handler(&Handler::new(f), false, true)
    }

    /// Subscribe a shared handler
    pub fn sub_handler(
        &self,
        handler: &Handler<T>,
        initial_notify: bool,
        paused: bool,
    ) -> HandlerSubscription<T> {
        let source = Rc::downgrade(&self.inner);
        let initial_value: InitialValueFn<T> = Box::new(move || {
            source
                .upgrade()
                .map(|inner| Rc::new(inner.value.borrow().clone()))
        });

        let owner: Weak<SubjectInner<T>> = Rc::downgrade(&self.inner);
        let on_destroy: OnDestroyFn<T> = Box::new(move |sub| {
            if let Some(inner) = owner.upgrade() {
                inner.subs.borrow_mut().retain(|s| !s.same_as(sub));
            }
        });

        let sub = HandlerSubscription::new(handler.clone(), Some(initial_value), Some(on_destroy));
        self.inner.subs.borrow_mut().push(sub.clone());

        if paused {
            sub.pause();
        } else if initial_notify {
            sub.initial_notify();
        }
        sub
    }

    /// Destroy the oldest live subscription of `handler`, if any
    pub fn unsub(&self, handler: &Handler<T>) {
        let found = self
            .inner
            .subs
            .borrow()
            .iter()
            .find(|s| s.handler().ptr_eq(handler))
            .cloned();
        if let Some(sub) = found {
            sub.destroy();
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.inner.subs.borrow().len()
    }

    /// Notify every active subscription of the current value.
    ///
    /// Iterates a snapshot; subscriptions added during the pass are not
    /// notified and subscriptions destroyed during the pass are skipped.
    pub fn notify(&self) {
        let snapshot: Vec<_> = self.inner.subs.borrow().clone();
        for sub in snapshot {
            if !sub.is_alive() || sub.is_paused() {
                continue;
            }
            let value = self.get();
            invoke_isolated("subject", || sub.notify(&value));
        }
    }
}

impl<T: Clone + 'static> Subscribable<T> for Subject<T> {
    fn get(&self) -> T {
        Subject::get(self)
    }

    fn sub_handler(
        &self,
        handler: &Handler<T>,
        initial_notify: bool,
        paused: bool,
    ) -> HandlerSubscription<T> {
        Subject::sub_handler(self, handler, initial_notify, paused)
    }

    fn unsub(&self, handler: &Handler<T>) {
        Subject::unsub(self, handler)
    }
}

impl<T: Clone + 'static> MutableSubscribable<T> for Subject<T> {
    fn set(&self, value: T) {
        Subject::set(self, value)
    }
}

impl<T: 'static> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: std::fmt::Debug + 'static> std::fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subject")
            .field("value", &*self.inner.value.borrow())
            .field("subscribers", &self.inner.subs.borrow().len())
            .finish()
    }
}
