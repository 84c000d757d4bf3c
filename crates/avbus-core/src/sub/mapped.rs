//! Derived subscribable values.
//!
//! - [`MappedSubject`]: a read-only value computed from one or two inputs,
//!   recomputed whenever an input notifies
//! - [`ComputedSubject`]: a settable raw value exposed through a transform

use std::cell::RefCell;
use std::rc::Rc;

use super::handler::Handler;
use super::subject::{Subject, Subscribable};
use super::subscription::{HandlerSubscription, Subscription};

struct MappedInner<T: 'static> {
    value: Subject<T>,
    inputs: Vec<Box<dyn Subscription>>,
}

/// A value derived from other subscribables.
///
/// Subscribers are notified only when the derived value changes under the
/// subject's equality function. The inputs hold the subject alive until
/// [`MappedSubject::destroy`] is called.
pub struct MappedSubject<T: 'static> {
    inner: Rc<MappedInner<T>>,
}

impl<T: Clone + 'static> MappedSubject<T> {
    /// Derive a value from one input
    pub fn from_source<I, S, F, E>(source: &S, map: F, equals: E) -> Self
    where
        I: 'static,
        S: Subscribable<I>,
        F: Fn(&I) -> T + 'static,
        E: Fn(&T, &T) -> bool + 'static,
    {
        let value = Subject::with_equality(map(&source.get()), equals);
        let target = value.clone();
        let input = source.sub_handler(
            &Handler::new(move |v: &I| target.set(map(v))),
            false,
            false,
        );
        Self {
            inner: Rc::new(MappedInner {
                value,
                inputs: vec![Box::new(input)],
            }),
        }
    }

    /// Derive a value from two inputs, using `PartialEq` to detect changes
    pub fn combine<A, B, SA, SB, F>(a: &SA, b: &SB, map: F) -> Self
    where
        T: PartialEq,
        A: 'static,
        B: 'static,
        SA: Subscribable<A> + Clone + 'static,
        SB: Subscribable<B> + Clone + 'static,
        F: Fn(&A, &B) -> T + 'static,
    {
        let map = Rc::new(map);
        let value = Subject::create(map(&a.get(), &b.get()));

        let recompute = {
            let (a, b, map, target) = (a.clone(), b.clone(), map.clone(), value.clone());
            Rc::new(move || target.set(map(&a.get(), &b.get())))
        };
        let on_a = recompute.clone();
        let sub_a = a.sub_handler(&Handler::new(move |_: &A| on_a()), false, false);
        let on_b = recompute;
        let sub_b = b.sub_handler(&Handler::new(move |_: &B| on_b()), false, false);

        Self {
            inner: Rc::new(MappedInner {
                value,
                inputs: vec![Box::new(sub_a), Box::new(sub_b)],
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.value.get()
    }

    /// Whether the subject still follows its inputs
    pub fn is_alive(&self) -> bool {
        self.inner.inputs.iter().any(|s| s.is_alive())
    }

    /// Stop following the inputs. The current value is kept.
    pub fn destroy(&self) {
        for input in &self.inner.inputs {
            input.destroy();
        }
    }

    /// Number of live subscriptions to the derived value
    pub fn subscriber_count(&self) -> usize {
        self.inner.value.subscriber_count()
    }
}

impl<T: Clone + 'static> Subscribable<T> for MappedSubject<T> {
    fn get(&self) -> T {
        MappedSubject::get(self)
    }

    fn sub_handler(
        &self,
        handler: &Handler<T>,
        initial_notify: bool,
        paused: bool,
    ) -> HandlerSubscription<T> {
        self.inner.value.sub_handler(handler, initial_notify, paused)
    }

    fn unsub(&self, handler: &Handler<T>) {
        self.inner.value.unsub(handler);
    }
}

impl<T: 'static> Clone for MappedSubject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: std::fmt::Debug + Clone + 'static> std::fmt::Debug for MappedSubject<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedSubject")
            .field("value", &self.get())
            .field("inputs", &self.inner.inputs.len())
            .finish()
    }
}

type ComputeFn<I, T> = Box<dyn Fn(&I) -> T>;

struct ComputedInner<I: 'static, T: 'static> {
    raw: RefCell<I>,
    value: Subject<T>,
    compute: ComputeFn<I, T>,
}

/// A settable raw value whose subscribers see a transformed value
pub struct ComputedSubject<I: 'static, T: 'static> {
    inner: Rc<ComputedInner<I, T>>,
}

impl<I: 'static, T: Clone + PartialEq + 'static> ComputedSubject<I, T> {
    pub fn create<F>(raw: I, compute: F) -> Self
    where
        F: Fn(&I) -> T + 'static,
    {
        let value = Subject::create(compute(&raw));
        Self {
            inner: Rc::new(ComputedInner {
                raw: RefCell::new(raw),
                value,
                compute: Box::new(compute),
            }),
        }
    }

    /// Replace the raw value. Subscribers hear about it only if the
    /// computed value changed.
    pub fn set(&self, raw: I) {
        let computed = (self.inner.compute)(&raw);
        *self.inner.raw.borrow_mut() = raw;
        self.inner.value.set(computed);
    }

    pub fn get(&self) -> T {
        self.inner.value.get()
    }

    /// The last raw value set
    pub fn get_raw(&self) -> I
    where
        I: Clone,
    {
        self.inner.raw.borrow().clone()
    }
}

impl<I: 'static, T: Clone + PartialEq + 'static> Subscribable<T> for ComputedSubject<I, T> {
    fn get(&self) -> T {
        ComputedSubject::get(self)
    }

    fn sub_handler(
        &self,
        handler: &Handler<T>,
        initial_notify: bool,
        paused: bool,
    ) -> HandlerSubscription<T> {
        self.inner.value.sub_handler(handler, initial_notify, paused)
    }

    fn unsub(&self, handler: &Handler<T>) {
        self.inner.value.unsub(handler);
    }
}

impl<I: 'static, T: 'static> Clone for ComputedSubject<I, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
