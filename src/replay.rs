//! Replay Queue Module
//!
//! Holds write requests that failed to reach the network so they can be
//! retried later, in order.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::Request;
use crate::network::Fetcher;

// == Queued Request ==
#[derive(Debug, Clone)]
pub struct QueuedRequest {
    pub request: Request,
    pub queued_at: DateTime<Utc>,
    pub attempts: u32,
}

// == Replay Report ==
/// Outcome of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Requests delivered to the network
    pub replayed: usize,
    /// Requests discarded for exceeding the retention window
    pub dropped: usize,
    /// Requests still waiting
    pub remaining: usize,
}

// == Replay Queue ==
/// FIFO of failed writes. Replay stops at the first failure so that
/// requests reach the network in the order they were made.
#[derive(Debug, Clone)]
pub struct ReplayQueue {
    queue: Arc<Mutex<VecDeque<QueuedRequest>>>,
    capacity: usize,
    retention: Option<Duration>,
}

impl ReplayQueue {
    /// Creates a queue holding at most `capacity` requests, each kept for
    /// at most `retention_secs`.
    pub fn new(capacity: usize, retention_secs: u64) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            capacity,
            retention: i64::try_from(retention_secs)
                .ok()
                .and_then(Duration::try_seconds),
        }
    }

    /// Appends a request. When full, the oldest queued request is dropped.
    pub async fn enqueue(&self, request: Request) {
        if self.capacity == 0 {
            return;
        }
        let mut queue = self.queue.lock().await;
        if queue.len() >= self.capacity {
            if let Some(dropped) = queue.pop_front() {
                warn!(url = %dropped.request.url, "Replay queue full, dropping oldest request");
            }
        }
        debug!(method = %request.method, url = %request.url, "Queued failed write for replay");
        queue.push_back(QueuedRequest {
            request,
            queued_at: Utc::now(),
            attempts: 0,
        });
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    // == Replay ==
    /// Sends queued requests until the queue is empty or a send fails.
    pub async fn replay(&self, fetcher: &dyn Fetcher) -> ReplayReport {
        let mut report = ReplayReport::default();
        let cutoff = self
            .retention
            .and_then(|retention| Utc::now().checked_sub_signed(retention));

        loop {
            let next = self.queue.lock().await.pop_front();
            let Some(mut queued) = next else {
                break;
            };

            if cutoff.is_some_and(|cutoff| queued.queued_at < cutoff) {
                warn!(url = %queued.request.url, "Dropping queued request past retention");
                report.dropped += 1;
                continue;
            }

            match fetcher.fetch(&queued.request).await {
                Ok(response) => {
                    debug!(url = %queued.request.url, status = response.status, "Replayed queued request");
                    report.replayed += 1;
                }
                Err(e) => {
                    queued.attempts += 1;
                    debug!(url = %queued.request.url, attempts = queued.attempts, "Replay failed: {}", e);
                    self.queue.lock().await.push_front(queued);
                    break;
                }
            }
        }

        report.remaining = self.len().await;
        if report.replayed > 0 || report.dropped > 0 {
            info!(
                replayed = report.replayed,
                dropped = report.dropped,
                remaining = report.remaining,
                "Replay pass finished"
            );
        }
        report
    }
}
