//! Eviction Manager Module
//!
//! Enforces per-partition entry caps and drops expired entries.
//!
//! Entries are evicted oldest-first by insertion (`stored_at`, then the
//! insertion sequence). Access time is not tracked.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStore, Fingerprint};
use crate::error::{Result, StorageResult};

// == Partition Limits ==
/// Size cap applied to one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionLimits {
    /// Maximum entries kept, None = unbounded
    pub max_entries: Option<usize>,
}

impl PartitionLimits {
    pub fn capped(max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries),
        }
    }

    pub fn unbounded() -> Self {
        Self { max_entries: None }
    }
}

// == Eviction Report ==
/// What a single eviction pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Entries removed because their ttl elapsed
    pub expired: usize,
    /// Entries removed to get under the cap
    pub evicted: usize,
}

impl EvictionReport {
    pub fn total(&self) -> usize {
        self.expired + self.evicted
    }

    fn merge(&mut self, other: EvictionReport) {
        self.expired += other.expired;
        self.evicted += other.evicted;
    }
}

// == Eviction Manager ==
/// Owns the write path into the store and keeps partitions within limits.
#[derive(Debug, Clone)]
pub struct EvictionManager {
    store: CacheStore,
    limits: Arc<HashMap<String, PartitionLimits>>,
    default_limits: PartitionLimits,
}

impl EvictionManager {
    /// Creates a manager with per-partition limits and a fallback for
    /// partitions that were not registered.
    pub fn new(
        store: CacheStore,
        limits: HashMap<String, PartitionLimits>,
        default_limits: PartitionLimits,
    ) -> Self {
        Self {
            store,
            limits: Arc::new(limits),
            default_limits,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn limits_for(&self, partition: &str) -> PartitionLimits {
        self.limits
            .get(partition)
            .copied()
            .unwrap_or(self.default_limits)
    }

    // == Store Entry ==
    /// Writes an entry and then enforces the partition's cap.
    ///
    /// A quota rejection triggers one full eviction pass and a single retry
    /// before it is reported as a storage failure.
    pub async fn store_entry(
        &self,
        fingerprint: &Fingerprint,
        partition: &str,
        entry: CacheEntry,
    ) -> Result<()> {
        match self.store.put(fingerprint, partition, entry.clone()).await {
            Ok(()) => {}
            Err(e) if e.is_quota_exceeded() => {
                info!(partition, "Storage quota exceeded, running eviction pass before retry");
                let report = self.sweep().await?;
                debug!(removed = report.total(), "Quota eviction pass finished");
                self.store.put(fingerprint, partition, entry).await?;
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.enforce_partition(partition).await {
            warn!(partition, "Post-write eviction failed: {}", e);
        }
        Ok(())
    }

    // == Enforce Partition ==
    /// Drops expired entries, then evicts the oldest until under the cap.
    pub async fn enforce_partition(&self, partition: &str) -> StorageResult<EvictionReport> {
        let now = Utc::now();
        let mut report = EvictionReport::default();

        let (expired, mut live): (Vec<CacheEntry>, Vec<CacheEntry>) = self
            .store
            .list_entries(partition)
            .await?
            .into_iter()
            .partition(|entry| entry.is_expired_at(now));

        for entry in expired {
            if self.store.evict(&entry, partition).await? {
                report.expired += 1;
            }
        }

        if let Some(max_entries) = self.limits_for(partition).max_entries {
            if live.len() > max_entries {
                live.sort_by_key(CacheEntry::insertion_key);
                let excess = live.len() - max_entries;
                for entry in live.iter().take(excess) {
                    if self.store.evict(entry, partition).await? {
                        report.evicted += 1;
                    }
                }
            }
        }

        if report.total() > 0 {
            debug!(
                partition,
                expired = report.expired,
                evicted = report.evicted,
                "Eviction pass removed entries"
            );
        }
        Ok(report)
    }

    // == Sweep ==
    /// Runs an eviction pass over every partition.
    pub async fn sweep(&self) -> StorageResult<EvictionReport> {
        let mut report = EvictionReport::default();
        for partition in self.store.list_partitions().await? {
            report.merge(self.enforce_partition(&partition).await?);
        }
        Ok(report)
    }
}
