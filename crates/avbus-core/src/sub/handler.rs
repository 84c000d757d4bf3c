//! Shared handler callbacks.
//!
//! A [`Handler`] wraps a callback in a reference-counted pointer. Cloning a
//! handler clones the reference, so every clone names the same callback.
//! That identity is what the legacy `off`/`unsub` calls match on.
//!
//! Callbacks are `Fn`: a handler may be re-entered by a publish it
//! triggers itself, so any state it mutates lives in its own cells.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

/// A callback invoked with a borrowed payload.
pub struct Handler<A: ?Sized + 'static> {
    f: Rc<dyn Fn(&A) + 'static>,
}

impl<A: ?Sized + 'static> Handler<A> {
    /// Wrap a callback
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&A) + 'static,
    {
        Self { f: Rc::new(f) }
    }

    /// Whether two handles name the same callback
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.f), Rc::as_ptr(&other.f))
    }

    /// Invoke the callback
    pub(crate) fn call(&self, value: &A) {
        (self.f)(value);
    }
}

impl<A: ?Sized + 'static> Clone for Handler<A> {
    fn clone(&self) -> Self {
        Self { f: self.f.clone() }
    }
}

impl<A: ?Sized + 'static> std::fmt::Debug for Handler<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handler({:p})", Rc::as_ptr(&self.f).cast::<()>())
    }
}

/// Run one handler invocation, containing any panic it raises.
///
/// Returns `false` if the invocation panicked. The fault is logged with
/// `context` (usually the topic name) and never propagates.
pub(crate) fn invoke_isolated(context: &str, f: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(fault) => {
            tracing::error!(
                topic = context,
                fault = %panic_message(fault.as_ref()),
                "error in handler"
            );
            false
        }
    }
}

fn panic_message(fault: &(dyn Any + Send)) -> String {
    if let Some(msg) = fault.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = fault.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
