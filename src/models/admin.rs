//! Response DTOs for the admin endpoints
//!
//! Defines the structure of the JSON bodies served under `/__sw/`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cache::CacheStats;
use crate::lifecycle::LifecycleState;

/// Response body for the health endpoint (GET /__sw/health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current lifecycle state of the worker
    pub lifecycle: LifecycleState,
    /// Name of the storage backend in use
    pub backend: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy(lifecycle: LifecycleState, backend: impl Into<String>) -> Self {
        Self {
            status: "healthy".to_string(),
            lifecycle,
            backend: backend.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Response body for the stats endpoint (GET /__sw/stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub evictions: u64,
    pub writes: u64,
    pub storage_failures: u64,
    /// Current number of entries across all partitions
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    pub partitions: BTreeMap<String, usize>,
    /// Failed writes waiting to be replayed
    pub replay_pending: usize,
}

impl StatsResponse {
    /// Creates a new StatsResponse from cache statistics
    pub fn new(stats: CacheStats, replay_pending: usize) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            expirations: stats.expirations,
            evictions: stats.evictions,
            writes: stats.writes,
            storage_failures: stats.storage_failures,
            total_entries: stats.total_entries,
            partitions: stats.partitions,
            replay_pending,
        }
    }
}

/// Response body for the partition listing (GET /__sw/partitions)
#[derive(Debug, Clone, Serialize)]
pub struct PartitionsResponse {
    pub partitions: Vec<String>,
}

/// Response body for DELETE /__sw/partitions/:name
#[derive(Debug, Clone, Serialize)]
pub struct DeletePartitionResponse {
    /// Success message
    pub message: String,
    /// The partition that was deleted
    pub partition: String,
}

impl DeletePartitionResponse {
    pub fn new(partition: impl Into<String>) -> Self {
        let partition = partition.into();
        Self {
            message: format!("Partition '{}' deleted successfully", partition),
            partition,
        }
    }
}
