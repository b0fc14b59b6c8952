//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the proxy serves.
//!
//! # Tasks
//! - Eviction sweep: drops expired entries and enforces partition caps
//! - Replay: retries write requests that failed to reach the network

mod eviction;
mod replay;

pub use eviction::spawn_eviction_task;
pub use replay::spawn_replay_task;

use std::time::Duration;

/// Sleep between task passes. A zero interval is raised to one second.
pub(crate) fn tick_interval(interval_secs: u64) -> Duration {
    Duration::from_secs(interval_secs.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_interval_is_raised_to_one_second() {
        assert_eq!(tick_interval(0), Duration::from_secs(1));
        assert_eq!(tick_interval(30), Duration::from_secs(30));
    }
}
