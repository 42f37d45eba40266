//! Background removal of expired entries.

use crate::TtlCache;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a running sweeper. The task stops when the handle is dropped.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stops the sweeper.
    pub fn stop(self) {
        // Drop aborts the task.
    }

    /// Returns `true` once the task has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Spawns a task that purges expired entries every `interval`.
    ///
    /// Expired entries otherwise stay in memory until deleted, invalidated,
    /// overwritten or purged, since stale-while-revalidate may still need them.
    pub fn spawn_sweeper(&self, interval: Duration) -> SweeperHandle {
        let cache = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.purge_expired();
                debug!(cache = %cache.name(), removed, "Sweep finished");
            }
        });

        SweeperHandle { task }
    }
}
