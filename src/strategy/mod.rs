//! Strategy Module
//!
//! Caching strategies, their per-route configuration, and the engine that
//! executes them.

mod engine;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::EngineDefaults;
use crate::error::EngineError;

pub use engine::StrategyEngine;

// == Strategy Kind ==
/// The algorithm governing network-vs-cache precedence for a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Serve from cache; go to the network only on a miss
    CacheFirst,
    /// Prefer the network within a timeout; fall back to cache
    NetworkFirst,
    /// Serve from cache and refresh in the background
    StaleWhileRevalidate,
    /// Never touch the cache
    NetworkOnly,
    /// Never touch the network
    CacheOnly,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::CacheFirst => "cache-first",
            StrategyKind::NetworkFirst => "network-first",
            StrategyKind::StaleWhileRevalidate => "stale-while-revalidate",
            StrategyKind::NetworkOnly => "network-only",
            StrategyKind::CacheOnly => "cache-only",
        }
    }

    /// Returns true if the strategy reads or writes the cache.
    pub fn uses_cache(&self) -> bool {
        !matches!(self, StrategyKind::NetworkOnly)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "cache-first" => Ok(StrategyKind::CacheFirst),
            "network-first" => Ok(StrategyKind::NetworkFirst),
            "stale-while-revalidate" => Ok(StrategyKind::StaleWhileRevalidate),
            "network-only" => Ok(StrategyKind::NetworkOnly),
            "cache-only" => Ok(StrategyKind::CacheOnly),
            other => Err(EngineError::Config(format!("unknown strategy '{}'", other))),
        }
    }
}

// == Strategy Options ==
/// Per-route options as written in the route table. Unset fields inherit
/// the global defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StrategyOptions {
    pub cache_name: Option<String>,
    pub max_entries: Option<usize>,
    pub max_age_seconds: Option<u64>,
    pub network_timeout_ms: Option<u64>,
    pub cacheable_statuses: Option<Vec<u16>>,
    pub replay_failed_writes: bool,
}

// == Strategy Config ==
/// Fully resolved configuration for one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyConfig {
    /// Versioned partition name
    pub cache_name: String,
    /// Eviction cap for the partition
    pub max_entries: usize,
    /// Freshness window of stored entries, None = never expires
    pub max_age_seconds: Option<u64>,
    /// Bound on the network attempt, None = unbounded
    pub network_timeout_ms: Option<u64>,
    /// Statuses eligible for storage
    pub cacheable_statuses: Vec<u16>,
    /// Queue failed non-GET requests for replay
    pub replay_failed_writes: bool,
}

impl StrategyConfig {
    /// Resolves route options against the global defaults.
    ///
    /// Network-first style strategies always get a timeout; the others are
    /// only bounded when the route asks for it. A max age of zero disables
    /// expiry.
    pub fn resolve(kind: StrategyKind, options: &StrategyOptions, defaults: &EngineDefaults) -> Self {
        let cache_name = options
            .cache_name
            .as_deref()
            .unwrap_or(defaults.cache_name.as_str());

        let network_timeout_ms = match kind {
            StrategyKind::NetworkFirst | StrategyKind::StaleWhileRevalidate => Some(
                options
                    .network_timeout_ms
                    .unwrap_or(defaults.network_timeout_ms),
            ),
            _ => options.network_timeout_ms,
        };

        Self {
            cache_name: defaults.partition_name(cache_name),
            max_entries: options.max_entries.unwrap_or(defaults.max_entries),
            max_age_seconds: options
                .max_age_seconds
                .or(defaults.max_age_seconds)
                .filter(|secs| *secs > 0),
            network_timeout_ms,
            cacheable_statuses: options
                .cacheable_statuses
                .clone()
                .unwrap_or_else(|| vec![200]),
            replay_failed_writes: options.replay_failed_writes,
        }
    }

    pub fn is_cacheable_status(&self, status: u16) -> bool {
        self.cacheable_statuses.contains(&status)
    }
}
