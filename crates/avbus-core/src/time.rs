//! Time sources and host scheduling.
//!
//! The bus never sleeps or spawns. Time-based filter stages read a [`Clock`]
//! injected into the bus, and periodic work (such as flushing a sync hub)
//! is handed to a host-provided [`Scheduler`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::types::Task;

/// Source of the current time in milliseconds.
pub trait Clock {
    /// Milliseconds since an arbitrary, fixed epoch.
    fn now_ms(&self) -> i64;
}

/// Wall clock backed by `chrono`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
///
/// Share it through an `Rc` between the bus and the test driving it.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<i64>,
}

impl ManualClock {
    /// Create a clock reading `start_ms`
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Cell::new(start_ms),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, now_ms: i64) {
        self.now.set(now_ms);
    }

    /// Move forward by `delta_ms`
    pub fn advance(&self, delta_ms: i64) {
        self.now.set(self.now.get() + delta_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.get()
    }
}

/// Host primitive that runs a task after a delay.
///
/// Timer fidelity (animation frame, OS timer, async runtime) belongs to the
/// implementation; the bus only relies on the task running eventually, on
/// the same thread.
pub trait Scheduler {
    /// Run `task` once, no earlier than `delay_ms` from now.
    fn after(&self, delay_ms: u64, task: Task);
}

struct Timer {
    due: i64,
    seq: u64,
    task: Task,
}

/// Deterministic scheduler driven by [`ManualScheduler::advance`].
///
/// Advancing moves the attached [`ManualClock`] to each timer's due time
/// before running it, so tasks observe the time they were scheduled for.
pub struct ManualScheduler {
    clock: Rc<ManualClock>,
    timers: RefCell<Vec<Timer>>,
    next_seq: Cell<u64>,
}

impl ManualScheduler {
    /// Create a scheduler with its own clock starting at zero
    pub fn new() -> Self {
        Self::with_clock(Rc::new(ManualClock::new(0)))
    }

    /// Create a scheduler that drives an existing clock
    pub fn with_clock(clock: Rc<ManualClock>) -> Self {
        Self {
            clock,
            timers: RefCell::new(Vec::new()),
            next_seq: Cell::new(0),
        }
    }

    /// The clock advanced by this scheduler
    pub fn clock(&self) -> Rc<ManualClock> {
        self.clock.clone()
    }

    /// Number of tasks waiting to run
    pub fn pending(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Advance time by `delta_ms`, running every task that falls due in
    /// order of due time (ties run in scheduling order).
    pub fn advance(&self, delta_ms: u64) {
        let target = self.clock.now_ms() + delta_ms as i64;
        while let Some(timer) = self.pop_due(target) {
            self.clock.set(timer.due.max(self.clock.now_ms()));
            (timer.task)();
        }
        self.clock.set(target);
    }

    fn pop_due(&self, target: i64) -> Option<Timer> {
        let mut timers = self.timers.borrow_mut();
        let index = timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= target)
            .min_by_key(|(_, t)| (t.due, t.seq))
            .map(|(i, _)| i)?;
        Some(timers.remove(index))
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn after(&self, delay_ms: u64, task: Task) {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        self.timers.borrow_mut().push(Timer {
            due: self.clock.now_ms() + delay_ms as i64,
            seq,
            task,
        });
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now_ms", &self.clock.now_ms())
            .field("pending", &self.pending())
            .finish()
    }
}
