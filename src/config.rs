//! Configuration Module
//!
//! Handles loading engine and server configuration from environment
//! variables, plus the JSON route table.

use std::env;
use std::path::PathBuf;

use crate::error::{EngineError, Result};
use crate::router::RouteConfig;
use crate::strategy::StrategyKind;

// == Engine Defaults ==
/// Global defaults applied to routes that leave options unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineDefaults {
    /// Strategy of the default route
    pub strategy: StrategyKind,
    /// Partition used when a route names none
    pub cache_name: String,
    pub max_entries: usize,
    /// None = entries never expire
    pub max_age_seconds: Option<u64>,
    pub network_timeout_ms: u64,
    /// Suffix appended to every partition name
    pub cache_version: String,
}

impl EngineDefaults {
    /// Versioned partition name, e.g. `api` → `api-v1`.
    pub fn partition_name(&self, cache_name: &str) -> String {
        format!("{}-{}", cache_name, self.cache_version)
    }
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Config::default().defaults()
    }
}

// == Config ==
/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Origin that intercepted requests are forwarded to
    pub upstream_url: String,
    /// Strategy for requests matching no route
    pub default_strategy: StrategyKind,
    /// Default partition name
    pub default_cache_name: String,
    /// Default per-partition entry cap
    pub default_max_entries: usize,
    /// Default freshness window in seconds, 0 = never expires
    pub default_max_age_seconds: u64,
    /// Default network-first timeout in milliseconds
    pub default_network_timeout_ms: u64,
    /// Eviction sweep interval in seconds
    pub cleanup_interval: u64,
    /// Replay pass interval in seconds
    pub replay_interval: u64,
    /// Partition version suffix; bumping it discards old partitions on activate
    pub cache_version: String,
    /// Directory for durable storage, None = in-memory
    pub storage_dir: Option<PathBuf>,
    /// Total storage quota in bytes, None = unlimited
    pub storage_quota_bytes: Option<u64>,
    /// JSON route table
    pub routes_file: Option<PathBuf>,
    /// URLs fetched into the precache partition on install
    pub precache_urls: Vec<String>,
    /// Request headers that take part in the fingerprint
    pub vary_headers: Vec<String>,
    /// Maximum queued failed writes
    pub replay_capacity: usize,
    /// How long a failed write is kept for replay, in seconds
    pub replay_retention: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `UPSTREAM_URL` - Origin to forward to (default: http://127.0.0.1:8080)
    /// - `DEFAULT_STRATEGY` - Strategy for unmatched requests (default: network-only)
    /// - `DEFAULT_CACHE_NAME` - Default partition (default: runtime)
    /// - `DEFAULT_MAX_ENTRIES` - Entry cap per partition (default: 100)
    /// - `DEFAULT_MAX_AGE_SECONDS` - Freshness window (default: 86400)
    /// - `DEFAULT_NETWORK_TIMEOUT_MS` - Network-first timeout (default: 3000)
    /// - `CLEANUP_INTERVAL` - Eviction sweep frequency in seconds (default: 60)
    /// - `REPLAY_INTERVAL` - Replay frequency in seconds (default: 30)
    /// - `CACHE_VERSION` - Partition version suffix (default: v1)
    /// - `STORAGE_DIR` - Durable storage directory (default: in-memory)
    /// - `STORAGE_QUOTA_BYTES` - Storage quota (default: unlimited)
    /// - `ROUTES_FILE` - JSON route table (default: none)
    /// - `PRECACHE_URLS` - Comma-separated URLs to precache (default: none)
    /// - `VARY_HEADERS` - Comma-separated fingerprint headers (default: accept)
    /// - `REPLAY_CAPACITY` - Queued failed writes kept (default: 100)
    /// - `REPLAY_RETENTION` - Seconds a failed write is kept (default: 86400)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            upstream_url: env::var("UPSTREAM_URL").unwrap_or(defaults.upstream_url),
            default_strategy: parse_var("DEFAULT_STRATEGY").unwrap_or(defaults.default_strategy),
            default_cache_name: env::var("DEFAULT_CACHE_NAME")
                .unwrap_or(defaults.default_cache_name),
            default_max_entries: parse_var("DEFAULT_MAX_ENTRIES")
                .unwrap_or(defaults.default_max_entries),
            default_max_age_seconds: parse_var("DEFAULT_MAX_AGE_SECONDS")
                .unwrap_or(defaults.default_max_age_seconds),
            default_network_timeout_ms: parse_var("DEFAULT_NETWORK_TIMEOUT_MS")
                .unwrap_or(defaults.default_network_timeout_ms),
            cleanup_interval: parse_var("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
            replay_interval: parse_var("REPLAY_INTERVAL").unwrap_or(defaults.replay_interval),
            cache_version: env::var("CACHE_VERSION").unwrap_or(defaults.cache_version),
            storage_dir: env::var("STORAGE_DIR").ok().map(PathBuf::from),
            storage_quota_bytes: parse_var("STORAGE_QUOTA_BYTES"),
            routes_file: env::var("ROUTES_FILE").ok().map(PathBuf::from),
            precache_urls: list_var("PRECACHE_URLS").unwrap_or(defaults.precache_urls),
            vary_headers: list_var("VARY_HEADERS").unwrap_or(defaults.vary_headers),
            replay_capacity: parse_var("REPLAY_CAPACITY").unwrap_or(defaults.replay_capacity),
            replay_retention: parse_var("REPLAY_RETENTION").unwrap_or(defaults.replay_retention),
        }
    }

    /// Global defaults for the router.
    pub fn defaults(&self) -> EngineDefaults {
        EngineDefaults {
            strategy: self.default_strategy,
            cache_name: self.default_cache_name.clone(),
            max_entries: self.default_max_entries,
            max_age_seconds: Some(self.default_max_age_seconds).filter(|secs| *secs > 0),
            network_timeout_ms: self.default_network_timeout_ms,
            cache_version: self.cache_version.clone(),
        }
    }

    /// Reads the route table, or returns an empty table when none is configured.
    pub fn load_routes(&self) -> Result<Vec<RouteConfig>> {
        let Some(path) = &self.routes_file else {
            return Ok(Vec::new());
        };
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("cannot read routes file {}: {}", path.display(), e))
        })?;
        parse_routes(&raw)
    }
}

/// Parses a JSON route table.
pub fn parse_routes(raw: &str) -> Result<Vec<RouteConfig>> {
    serde_json::from_str(raw).map_err(|e| EngineError::Config(format!("invalid route table: {}", e)))
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn list_var(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect()
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            upstream_url: "http://127.0.0.1:8080".to_string(),
            default_strategy: StrategyKind::NetworkOnly,
            default_cache_name: "runtime".to_string(),
            default_max_entries: 100,
            default_max_age_seconds: 86_400,
            default_network_timeout_ms: 3_000,
            cleanup_interval: 60,
            replay_interval: 30,
            cache_version: "v1".to_string(),
            storage_dir: None,
            storage_quota_bytes: None,
            routes_file: None,
            precache_urls: Vec::new(),
            vary_headers: vec!["accept".to_string()],
            replay_capacity: 100,
            replay_retention: 86_400,
        }
    }
}
