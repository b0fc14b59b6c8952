//! Storage Backend Module
//!
//! The persistent key-value capability the cache store is built on.

use async_trait::async_trait;

use crate::cache::{CacheEntry, Fingerprint};
use crate::error::StorageResult;

/// A partitioned key-value store of cache entries.
///
/// Implementations must make `put` atomic per entry: after it returns the
/// entry is either fully replaced or untouched. Partitions are independent
/// and operations on different partitions must not contend.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// A name for logging.
    fn name(&self) -> &'static str;

    /// Returns the stored entry, including expired ones.
    async fn get(&self, partition: &str, fingerprint: &Fingerprint)
        -> StorageResult<Option<CacheEntry>>;

    /// Stores the entry under `entry.fingerprint`, replacing any previous one.
    async fn put(&self, partition: &str, entry: CacheEntry) -> StorageResult<()>;

    /// Removes an entry. Returns whether it existed.
    async fn delete(&self, partition: &str, fingerprint: &Fingerprint) -> StorageResult<bool>;

    /// Removes the entry under `observed.fingerprint` only if it is still the
    /// one that was observed (same `insertion_key`). A newer entry written
    /// in the meantime is left alone. Returns whether anything was removed.
    async fn delete_if_current(&self, partition: &str, observed: &CacheEntry)
        -> StorageResult<bool>;

    /// Returns every entry in a partition, in no particular order.
    async fn list_entries(&self, partition: &str) -> StorageResult<Vec<CacheEntry>>;

    /// Returns the names of all partitions holding data.
    async fn list_partitions(&self) -> StorageResult<Vec<String>>;

    /// Drops a partition and everything in it. Returns whether it existed.
    async fn delete_partition(&self, partition: &str) -> StorageResult<bool>;
}
