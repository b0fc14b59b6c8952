//! Replay Task
//!
//! Background task that periodically retries queued failed writes.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::network::Fetcher;
use crate::replay::ReplayQueue;

/// Spawns a background task that drains the replay queue every
/// `interval_secs` seconds.
pub fn spawn_replay_task(
    queue: ReplayQueue,
    fetcher: Arc<dyn Fetcher>,
    interval_secs: u64,
) -> JoinHandle<()> {
    let interval = super::tick_interval(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting replay task with interval of {} seconds",
            interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            if queue.is_empty().await {
                debug!("Replay: queue empty");
                continue;
            }
            queue.replay(fetcher.as_ref()).await;
        }
    })
}
