//! In-Memory Backend
//!
//! Partitioned in-memory storage with an optional byte quota.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::{CacheEntry, Fingerprint, StorageBackend};
use crate::error::{StorageError, StorageResult};

type Partition = Arc<RwLock<HashMap<Fingerprint, CacheEntry>>>;

// == Memory Backend ==
/// Keeps every partition behind its own lock.
///
/// The outer map lock is only held long enough to look up or create a
/// partition handle.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    partitions: RwLock<HashMap<String, Partition>>,
    quota_bytes: Option<u64>,
    used_bytes: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that rejects writes beyond `quota_bytes` in total.
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::default()
        }
    }

    /// Bytes currently accounted against the quota.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::Acquire)
    }

    async fn partition(&self, name: &str) -> Option<Partition> {
        self.partitions.read().await.get(name).cloned()
    }

    async fn partition_or_create(&self, name: &str) -> Partition {
        if let Some(partition) = self.partition(name).await {
            return partition;
        }
        let mut partitions = self.partitions.write().await;
        partitions.entry(name.to_string()).or_default().clone()
    }

    /// Reserves `added - removed` bytes, failing if the quota would be exceeded.
    fn reserve(&self, added: u64, removed: u64) -> StorageResult<()> {
        let quota = self.quota_bytes;
        self.used_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                let next = used.saturating_sub(removed) + added;
                match quota {
                    Some(limit) if added > removed && next > limit => None,
                    _ => Some(next),
                }
            })
            .map(|_| ())
            .map_err(|used| StorageError::QuotaExceeded {
                needed: added,
                available: quota.unwrap_or(u64::MAX).saturating_sub(used.saturating_sub(removed)),
            })
    }

    fn release(&self, bytes: u64) {
        let _ = self
            .used_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(
        &self,
        partition: &str,
        fingerprint: &Fingerprint,
    ) -> StorageResult<Option<CacheEntry>> {
        let Some(partition) = self.partition(partition).await else {
            return Ok(None);
        };
        let entries = partition.read().await;
        Ok(entries.get(fingerprint).cloned())
    }

    async fn put(&self, partition: &str, entry: CacheEntry) -> StorageResult<()> {
        let partition = self.partition_or_create(partition).await;
        let mut entries = partition.write().await;

        let removed = entries
            .get(&entry.fingerprint)
            .map(CacheEntry::size_bytes)
            .unwrap_or(0);
        self.reserve(entry.size_bytes(), removed)?;

        entries.insert(entry.fingerprint.clone(), entry);
        Ok(())
    }

    async fn delete(&self, partition: &str, fingerprint: &Fingerprint) -> StorageResult<bool> {
        let Some(partition) = self.partition(partition).await else {
            return Ok(false);
        };
        let mut entries = partition.write().await;
        match entries.remove(fingerprint) {
            Some(entry) => {
                self.release(entry.size_bytes());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_if_current(
        &self,
        partition: &str,
        observed: &CacheEntry,
    ) -> StorageResult<bool> {
        let Some(partition) = self.partition(partition).await else {
            return Ok(false);
        };
        let mut entries = partition.write().await;
        let current = entries
            .get(&observed.fingerprint)
            .is_some_and(|entry| entry.insertion_key() == observed.insertion_key());
        if !current {
            return Ok(false);
        }
        if let Some(entry) = entries.remove(&observed.fingerprint) {
            self.release(entry.size_bytes());
        }
        Ok(true)
    }

    async fn list_entries(&self, partition: &str) -> StorageResult<Vec<CacheEntry>> {
        let Some(partition) = self.partition(partition).await else {
            return Ok(Vec::new());
        };
        let entries = partition.read().await;
        Ok(entries.values().cloned().collect())
    }

    async fn list_partitions(&self) -> StorageResult<Vec<String>> {
        let mut names: Vec<String> = self.partitions.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete_partition(&self, partition: &str) -> StorageResult<bool> {
        let removed = self.partitions.write().await.remove(partition);
        match removed {
            Some(partition) => {
                let entries = partition.read().await;
                self.release(entries.values().map(CacheEntry::size_bytes).sum());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Request, Response};
    use crate::strategy::StrategyKind;

    fn entry(url: &str, body: &str) -> CacheEntry {
        let fp = Fingerprint::compute(&Request::get(url), &[]).unwrap();
        CacheEntry::from_response(fp, url, &Response::new(200, body), StrategyKind::CacheFirst, None)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let backend = MemoryBackend::new();
        let e = entry("https://example.com/a", "hello");
        backend.put("p", e.clone()).await.unwrap();

        let found = backend.get("p", &e.fingerprint).await.unwrap();
        assert_eq!(found, Some(e));
    }

    #[tokio::test]
    async fn test_partitions_are_independent() {
        let backend = MemoryBackend::new();
        let e = entry("https://example.com/a", "hello");
        backend.put("one", e.clone()).await.unwrap();

        assert!(backend.get("two", &e.fingerprint).await.unwrap().is_none());
        assert_eq!(backend.list_partitions().await.unwrap(), vec!["one".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_if_current_keeps_newer_entry() {
        let backend = MemoryBackend::new();
        let old = entry("https://example.com/a", "old");
        let new = entry("https://example.com/a", "new");
        backend.put("p", old.clone()).await.unwrap();
        backend.put("p", new.clone()).await.unwrap();

        assert!(!backend.delete_if_current("p", &old).await.unwrap());
        assert_eq!(backend.get("p", &new.fingerprint).await.unwrap(), Some(new.clone()));

        assert!(backend.delete_if_current("p", &new).await.unwrap());
        assert_eq!(backend.used_bytes(), 0);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let backend = MemoryBackend::new();
        let e = entry("https://example.com/a", "hello");
        backend.put("p", e.clone()).await.unwrap();

        assert!(backend.delete("p", &e.fingerprint).await.unwrap());
        assert!(!backend.delete("p", &e.fingerprint).await.unwrap());
        assert!(!backend.delete("missing", &e.fingerprint).await.unwrap());
    }

    #[tokio::test]
    async fn test_quota_rejects_oversized_write() {
        let small = entry("https://example.com/a", "x");
        let backend = MemoryBackend::with_quota(small.size_bytes() + 4);
        backend.put("p", small.clone()).await.unwrap();

        let big = entry("https://example.com/b", &"y".repeat(64));
        let err = backend.put("p", big.clone()).await.unwrap_err();
        assert!(err.is_quota_exceeded());
        assert!(backend.get("p", &big.fingerprint).await.unwrap().is_none());

        // Freeing space makes room again
        backend.delete("p", &small.fingerprint).await.unwrap();
        assert_eq!(backend.used_bytes(), 0);
    }

    #[tokio::test]
    async fn test_overwrite_accounts_for_replaced_entry() {
        let first = entry("https://example.com/a", "0123456789");
        let backend = MemoryBackend::with_quota(first.size_bytes());
        backend.put("p", first.clone()).await.unwrap();

        // Same size replacement fits because the old bytes are released
        let second = entry("https://example.com/a", "abcdefghij");
        backend.put("p", second.clone()).await.unwrap();
        assert_eq!(backend.used_bytes(), second.size_bytes());
    }

    #[tokio::test]
    async fn test_delete_partition_releases_bytes() {
        let backend = MemoryBackend::with_quota(10_000);
        backend.put("p", entry("https://example.com/a", "abc")).await.unwrap();
        backend.put("p", entry("https://example.com/b", "def")).await.unwrap();

        assert!(backend.delete_partition("p").await.unwrap());
        assert_eq!(backend.used_bytes(), 0);
        assert!(backend.list_entries("p").await.unwrap().is_empty());
    }
}
