//! Host scheduling on a tokio runtime.

use std::time::Duration;

use avbus_core::{Scheduler, Task};

/// Runs scheduled tasks on the current thread's tokio `LocalSet`.
///
/// Tasks are not `Send`, so [`TokioScheduler::after`] must be called from
/// inside `LocalSet::run_until` (or a task spawned on the set).
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn after(&self, delay_ms: u64, task: Task) {
        tokio::task::spawn_local(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            task();
        });
    }
}
