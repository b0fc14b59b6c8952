//! Cache Store Module
//!
//! Partitioned cache over an injected storage backend, adding lazy TTL
//! expiry on read and statistics.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn, Instrument};

use crate::cache::{CacheEntry, CacheStats, Fingerprint, StatsRecorder, StorageBackend};
use crate::error::StorageResult;

// == Cache Store ==
/// Shared handle to the cache. Cloning is cheap and every clone sees the
/// same backend and counters.
#[derive(Clone)]
pub struct CacheStore {
    /// Persistent key-value capability
    backend: Arc<dyn StorageBackend>,
    /// Performance statistics
    stats: Arc<StatsRecorder>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl CacheStore {
    // == Constructor ==
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            stats: Arc::new(StatsRecorder::new()),
        }
    }

    // == Get ==
    /// Retrieves a fresh entry.
    ///
    /// An expired entry is reported as absent and its deletion is scheduled
    /// on a detached task rather than performed inline.
    pub async fn get(
        &self,
        fingerprint: &Fingerprint,
        cache_name: &str,
    ) -> StorageResult<Option<CacheEntry>> {
        let entry = match self.backend.get(cache_name, fingerprint).await {
            Ok(entry) => entry,
            Err(e) => {
                self.stats.record_storage_failure();
                return Err(e);
            }
        };

        match entry {
            Some(entry) if entry.is_expired() => {
                self.stats.record_expiration();
                self.schedule_delete(entry, cache_name.to_string());
                Ok(None)
            }
            Some(entry) => {
                self.stats.record_hit();
                Ok(Some(entry))
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    // == Put ==
    /// Stores an entry, fully replacing any previous one for the fingerprint.
    ///
    /// The entry is stored exactly as given, so repeating a `put` with an
    /// identical entry leaves the observable state unchanged.
    pub async fn put(
        &self,
        fingerprint: &Fingerprint,
        cache_name: &str,
        mut entry: CacheEntry,
    ) -> StorageResult<()> {
        entry.fingerprint = fingerprint.clone();
        match self.backend.put(cache_name, entry).await {
            Ok(()) => {
                self.stats.record_write();
                Ok(())
            }
            Err(e) => {
                self.stats.record_storage_failure();
                Err(e)
            }
        }
    }

    // == Delete ==
    /// Removes an entry. Returns whether it existed.
    pub async fn delete(&self, fingerprint: &Fingerprint, cache_name: &str) -> StorageResult<bool> {
        self.backend.delete(cache_name, fingerprint).await
    }

    /// Removes a previously read entry unless it has since been replaced.
    pub async fn delete_if_current(&self, observed: &CacheEntry, cache_name: &str) -> StorageResult<bool> {
        self.backend.delete_if_current(cache_name, observed).await
    }

    /// Removes an entry on behalf of the eviction manager, unless it has been
    /// replaced since it was listed.
    pub(crate) async fn evict(&self, observed: &CacheEntry, cache_name: &str) -> StorageResult<bool> {
        let removed = self.delete_if_current(observed, cache_name).await?;
        if removed {
            self.stats.record_evictions(1);
        }
        Ok(removed)
    }

    // == List ==
    /// Returns every entry in a partition, expired ones included.
    pub async fn list_entries(&self, cache_name: &str) -> StorageResult<Vec<CacheEntry>> {
        self.backend.list_entries(cache_name).await
    }

    pub async fn list_partitions(&self) -> StorageResult<Vec<String>> {
        self.backend.list_partitions().await
    }

    /// Drops a whole partition. Returns whether it existed.
    pub async fn delete_partition(&self, cache_name: &str) -> StorageResult<bool> {
        let removed = self.backend.delete_partition(cache_name).await?;
        if removed {
            debug!(partition = cache_name, "Partition deleted");
        }
        Ok(removed)
    }

    // == Stats ==
    /// Returns current statistics including per-partition entry counts.
    pub async fn stats(&self) -> StorageResult<CacheStats> {
        let mut partitions = BTreeMap::new();
        for name in self.list_partitions().await? {
            let count = self.list_entries(&name).await?.len();
            partitions.insert(name, count);
        }
        Ok(self.stats.snapshot(partitions))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Deletes the expired entry in the background. A fresh entry stored
    /// under the same fingerprint before the task runs is kept.
    fn schedule_delete(&self, expired: CacheEntry, cache_name: String) {
        let backend = self.backend.clone();
        let span = tracing::debug_span!("expire", partition = %cache_name, fingerprint = %expired.fingerprint);
        tokio::spawn(
            async move {
                match backend.delete_if_current(&cache_name, &expired).await {
                    Ok(true) => debug!("Expired entry removed"),
                    Ok(false) => debug!("Expired entry already replaced"),
                    Err(e) => warn!("Failed to remove expired entry: {}", e),
                }
            }
            .instrument(span),
        );
    }
}
