//! Eviction Sweep Task
//!
//! Background task that periodically runs an eviction pass over every
//! partition.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::EvictionManager;

/// Spawns a background task that periodically sweeps the cache.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between passes. A failed pass is logged and retried on the next tick.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_eviction_task(worker.eviction().clone(), 60);
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_eviction_task(eviction: EvictionManager, interval_secs: u64) -> JoinHandle<()> {
    let interval = super::tick_interval(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting eviction task with interval of {} seconds",
            interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            match eviction.sweep().await {
                Ok(report) if report.total() > 0 => info!(
                    "Eviction sweep: removed {} expired and {} over-cap entries",
                    report.expired, report.evicted
                ),
                Ok(_) => debug!("Eviction sweep: nothing to remove"),
                Err(e) => warn!("Eviction sweep failed: {}", e),
            }
        }
    })
}
