//! Cross-instance bus synchronization.
//!
//! A bus forwards events published with `sync` to an installed [`BusSync`]
//! hook. [`SyncHub`] is the in-process hook: it queues events per attached
//! bus and, on each flush, delivers every bus's package to all the others.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use uuid::Uuid;

use super::bus::{BusId, EventBus, WeakEventBus};
use crate::error::EventBusError;
use crate::time::Scheduler;
use crate::types::SharedPayload;

/// One event forwarded to peer buses
#[derive(Clone)]
pub struct SyncEvent {
    /// Topic the event was published on.
    pub topic: String,
    /// The published payload.
    pub payload: SharedPayload,
    /// Whether peers should retain the payload.
    pub cached: bool,
}

impl std::fmt::Debug for SyncEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEvent")
            .field("topic", &self.topic)
            .field("cached", &self.cached)
            .finish_non_exhaustive()
    }
}

/// A batch of events sent by one bus during one frame
#[derive(Debug, Clone)]
pub struct SyncPackage {
    /// The sending bus.
    pub bus_id: BusId,
    /// Unique per package; receivers drop repeats.
    pub package_id: Uuid,
    /// Events in publish order.
    pub events: Vec<SyncEvent>,
}

/// Hook that receives events published with `sync`
pub trait BusSync {
    /// Queue or forward one event
    fn send_event(&self, event: SyncEvent);
}

/// Per-bus outgoing queue registered with a hub
struct Outbox {
    bus_id: BusId,
    queue: RefCell<Vec<SyncEvent>>,
}

impl BusSync for Outbox {
    fn send_event(&self, event: SyncEvent) {
        self.queue.borrow_mut().push(event);
    }
}

struct Endpoint {
    bus: WeakEventBus,
    outbox: Rc<Outbox>,
}

struct HubInner {
    endpoints: RefCell<Vec<Endpoint>>,
    running: Cell<bool>,
    /// Bumped by every start and stop; frames from older runs retire
    generation: Cell<u64>,
}

/// Links several buses in one process.
///
/// Events are batched per bus and exchanged on [`SyncHub::flush`], or
/// periodically once [`SyncHub::start`] has been called.
#[derive(Clone)]
pub struct SyncHub {
    inner: Rc<HubInner>,
}

impl SyncHub {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(HubInner {
                endpoints: RefCell::new(Vec::new()),
                running: Cell::new(false),
                generation: Cell::new(0),
            }),
        }
    }

    /// Attach a bus. Fails if the bus already has a sync hook.
    pub fn attach(&self, bus: &EventBus) -> Result<(), EventBusError> {
        let outbox = Rc::new(Outbox {
            bus_id: bus.id(),
            queue: RefCell::new(Vec::new()),
        });
        bus.install_sync(outbox.clone())?;
        self.inner.endpoints.borrow_mut().push(Endpoint {
            bus: bus.downgrade(),
            outbox,
        });
        tracing::info!(bus = %bus.id(), "bus attached to sync hub");
        Ok(())
    }

    /// Detach a bus, dropping any events it has not yet flushed
    pub fn detach(&self, bus: &EventBus) {
        let id = bus.id();
        let before = self.inner.endpoints.borrow().len();
        self.inner
            .endpoints
            .borrow_mut()
            .retain(|e| e.outbox.bus_id != id);
        if self.inner.endpoints.borrow().len() != before {
            bus.remove_sync();
            tracing::info!(bus = %id, "bus detached from sync hub");
        }
    }

    /// Number of attached buses still alive
    pub fn len(&self) -> usize {
        self.inner
            .endpoints
            .borrow()
            .iter()
            .filter(|e| e.bus.upgrade().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exchange queued events between all attached buses.
    ///
    /// Every outbox is drained before anything is delivered, so events
    /// published by handlers during delivery go out on the next flush.
    /// Returns the number of packages delivered.
    pub fn flush(&self) -> usize {
        self.inner
            .endpoints
            .borrow_mut()
            .retain(|e| e.bus.upgrade().is_some());

        let packages: Vec<SyncPackage> = self
            .inner
            .endpoints
            .borrow()
            .iter()
            .filter_map(|e| {
                let events = std::mem::take(&mut *e.outbox.queue.borrow_mut());
                (!events.is_empty()).then(|| SyncPackage {
                    bus_id: e.outbox.bus_id,
                    package_id: Uuid::new_v4(),
                    events,
                })
            })
            .collect();

        let receivers: Vec<EventBus> = self
            .inner
            .endpoints
            .borrow()
            .iter()
            .filter_map(|e| e.bus.upgrade())
            .collect();

        let mut delivered = 0;
        for package in &packages {
            for bus in receivers.iter().filter(|b| b.id() != package.bus_id) {
                bus.receive_package(package);
                delivered += 1;
            }
        }
        if delivered > 0 {
            tracing::trace!(packages = packages.len(), delivered, "sync hub flushed");
        }
        delivered
    }

    /// Flush every `frame_ms` on the given scheduler until [`SyncHub::stop`]
    pub fn start(&self, scheduler: Rc<dyn Scheduler>, frame_ms: u64) {
        if self.inner.running.replace(true) {
            return;
        }
        let generation = self.bump_generation();
        tracing::debug!(frame_ms, generation, "sync hub started");
        schedule_frame(Rc::downgrade(&self.inner), scheduler, frame_ms, generation);
    }

    /// Stop periodic flushing. The pending frame runs as a no-op.
    pub fn stop(&self) {
        if self.inner.running.replace(false) {
            self.bump_generation();
            tracing::debug!("sync hub stopped");
        }
    }

    fn bump_generation(&self) -> u64 {
        let next = self.inner.generation.get().wrapping_add(1);
        self.inner.generation.set(next);
        next
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }
}

fn schedule_frame(
    hub: Weak<HubInner>,
    scheduler: Rc<dyn Scheduler>,
    frame_ms: u64,
    generation: u64,
) {
    let next = scheduler.clone();
    scheduler.after(
        frame_ms,
        Box::new(move || {
            let Some(inner) = hub.upgrade() else {
                return;
            };
            if !inner.running.get() || inner.generation.get() != generation {
                return;
            }
            SyncHub { inner }.flush();
            schedule_frame(hub, next, frame_ms, generation);
        }),
    );
}

impl Default for SyncHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SyncHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHub")
            .field("buses", &self.len())
            .field("running", &self.is_running())
            .finish()
    }
}
