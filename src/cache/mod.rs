//! Cache Module
//!
//! Partitioned response storage with TTL freshness and insertion-order
//! eviction, over a pluggable persistent backend.

mod backend;
mod entry;
mod eviction;
mod file;
mod fingerprint;
mod memory;
mod stats;
mod store;


// Re-export public types
pub use backend::StorageBackend;
pub use entry::CacheEntry;
pub use eviction::{EvictionManager, EvictionReport, PartitionLimits};
pub use file::FileBackend;
pub use fingerprint::{normalize_url, Fingerprint};
pub use memory::MemoryBackend;
pub use stats::{CacheStats, StatsRecorder};
pub use store::CacheStore;

// == Public Constants ==
/// Partition receiving the URLs fetched during install
pub const PRECACHE_PARTITION: &str = "precache";

/// Longest partition name in bytes. The file backend hex-encodes names into
/// directory names, which are limited to 255 bytes.
pub const MAX_PARTITION_NAME_LEN: usize = 127;
