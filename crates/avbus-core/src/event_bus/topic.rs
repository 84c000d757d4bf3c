//! Typed topic keys.
//!
//! A topic is a string on the wire, but every [`Topic`] value also carries
//! the payload type its producers and consumers agree on. Two `Topic`
//! values with the same name and different payload types address the same
//! subscriber list; deliveries whose payload type does not match a handler
//! are skipped with a warning.

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// A topic name bound to a payload type `P`.
pub struct Topic<P> {
    name: Cow<'static, str>,
    _payload: PhantomData<fn() -> P>,
}

impl<P> Topic<P> {
    /// A topic with a fixed name, usable in `const` items
    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            _payload: PhantomData,
        }
    }

    /// A topic whose name is computed at runtime
    pub fn dynamic(name: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            _payload: PhantomData,
        }
    }

    /// The topic name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<P> Clone for Topic<P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _payload: PhantomData,
        }
    }
}

impl<P> PartialEq for Topic<P> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<P> Eq for Topic<P> {}

impl<P> fmt::Debug for Topic<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("payload", &std::any::type_name::<P>())
            .finish()
    }
}

impl<P> fmt::Display for Topic<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Control messages exchanged between buses on [`EVENT_BUS_TOPIC`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusControl {
    /// Ask peers to re-send every cached event originally published with sync.
    ResyncRequest,
}

/// Bus-to-bus control topic.
pub const EVENT_BUS_TOPIC: Topic<BusControl> = Topic::new("event_bus");

/// Published with a topic's name the first time that topic gains a subscriber.
pub const FIRST_SUB_TOPIC: Topic<String> = Topic::new("event_bus_topic_first_sub");
