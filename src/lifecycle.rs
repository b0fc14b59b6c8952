//! Lifecycle Controller
//!
//! Entry points invoked by the host: install, activate and per-request
//! interception. Like a worker that skips waiting and claims its clients
//! immediately, interception is served in every lifecycle state.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{
    normalize_url, CacheEntry, CacheStore, EvictionManager, Fingerprint, PartitionLimits,
    StorageBackend, PRECACHE_PARTITION,
};
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::models::{Request, Response};
use crate::network::Fetcher;
use crate::replay::ReplayQueue;
use crate::router::{RouteConfig, Router};
use crate::strategy::{StrategyEngine, StrategyKind};

// == Lifecycle State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; the controller still serves requests
    Redundant,
}

// == Service Worker ==
/// Wires routing, strategies and storage behind the host-facing hooks.
#[derive(Clone)]
pub struct ServiceWorker {
    router: Arc<Router>,
    engine: StrategyEngine,
    state: Arc<RwLock<LifecycleState>>,
    precache_urls: Arc<[String]>,
    /// Normalized forms of `precache_urls`
    precache_index: Arc<HashSet<String>>,
    precache_partition: String,
}

impl ServiceWorker {
    /// Builds the controller from configuration and injected capabilities.
    pub fn new(
        config: &Config,
        routes: &[RouteConfig],
        backend: Arc<dyn StorageBackend>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        let defaults = config.defaults();
        let router = Router::new(routes, &defaults)?;
        let precache_partition = defaults.partition_name(PRECACHE_PARTITION);

        let mut limits = router.partition_limits();
        limits.insert(precache_partition.clone(), PartitionLimits::unbounded());

        let store = CacheStore::new(backend);
        let eviction = EvictionManager::new(
            store,
            limits,
            PartitionLimits::capped(defaults.max_entries),
        );
        let replay = ReplayQueue::new(config.replay_capacity, config.replay_retention);
        let engine = StrategyEngine::new(eviction, fetcher, replay, config.vary_headers.clone());

        let precache_index = config
            .precache_urls
            .iter()
            .map(|url| normalize_url(url).map(|url| url.to_string()))
            .collect::<Result<HashSet<String>>>()
            .map_err(|e| EngineError::Config(format!("invalid precache URL: {}", e)))?;

        Ok(Self {
            router: Arc::new(router),
            engine,
            state: Arc::new(RwLock::new(LifecycleState::Parsed)),
            precache_urls: config.precache_urls.clone().into(),
            precache_index: Arc::new(precache_index),
            precache_partition,
        })
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, next: LifecycleState) {
        let mut state = self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        debug!(from = ?*state, to = ?next, "Lifecycle transition");
        *state = next;
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn engine(&self) -> &StrategyEngine {
        &self.engine
    }

    pub fn store(&self) -> &CacheStore {
        self.engine.store()
    }

    pub fn eviction(&self) -> &EvictionManager {
        self.engine.eviction()
    }

    pub fn replay_queue(&self) -> &ReplayQueue {
        self.engine.replay_queue()
    }

    pub fn precache_partition(&self) -> &str {
        &self.precache_partition
    }

    // == Install ==
    /// Fetches every precache URL into the precache partition.
    ///
    /// All-or-nothing: any failed fetch, non-success status or failed write
    /// aborts the install and leaves the controller redundant.
    pub async fn on_install(&self) -> Result<usize> {
        self.set_state(LifecycleState::Installing);
        info!(urls = self.precache_urls.len(), "Installing");

        match self.precache().await {
            Ok(count) => {
                self.set_state(LifecycleState::Installed);
                info!(count, "Install complete");
                Ok(count)
            }
            Err(e) => {
                self.set_state(LifecycleState::Redundant);
                warn!("Install failed: {}", e);
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize> {
        let mut fetched = Vec::with_capacity(self.precache_urls.len());
        for url in self.precache_urls.iter() {
            let request = Request::get(url.as_str());
            let fingerprint = Fingerprint::compute(&request, &[])?;
            let response = self.engine.fetcher().fetch(&request).await?;
            if !(200..300).contains(&response.status) {
                return Err(EngineError::ResourceUnavailable(format!(
                    "precache {} returned status {}",
                    url, response.status
                )));
            }
            fetched.push(CacheEntry::from_response(
                fingerprint,
                url.as_str(),
                &response,
                StrategyKind::CacheFirst,
                None,
            ));
        }

        // Only write once every fetch succeeded
        let mut written = Vec::with_capacity(fetched.len());
        for entry in fetched {
            let fingerprint = entry.fingerprint.clone();
            if let Err(e) = self
                .eviction()
                .store_entry(&fingerprint, &self.precache_partition, entry.clone())
                .await
            {
                self.discard_precached(&written).await;
                return Err(e);
            }
            written.push(entry);
        }
        Ok(written.len())
    }

    /// Removes entries written by a failed install.
    async fn discard_precached(&self, written: &[CacheEntry]) {
        for entry in written {
            if let Err(e) = self
                .store()
                .delete_if_current(entry, &self.precache_partition)
                .await
            {
                warn!(url = %entry.url, "Failed to roll back precached entry: {}", e);
            }
        }
    }

    // == Activate ==
    /// Deletes partitions the current configuration no longer names, then
    /// marks the controller active. Returns the deleted partition names.
    pub async fn on_activate(&self) -> Result<Vec<String>> {
        self.set_state(LifecycleState::Activating);

        let mut keep = self.router.partition_names();
        keep.insert(self.precache_partition.clone());

        let mut deleted = Vec::new();
        for partition in self.store().list_partitions().await? {
            if keep.contains(&partition) {
                continue;
            }
            if self.store().delete_partition(&partition).await? {
                info!(partition = %partition, "Deleted outdated partition");
                deleted.push(partition);
            }
        }

        self.set_state(LifecycleState::Activated);
        info!(deleted = deleted.len(), "Activated");
        Ok(deleted)
    }

    // == Intercept ==
    /// Handles one intercepted request.
    ///
    /// Precached GET requests are answered from the precache partition;
    /// everything else goes through the router and its strategy.
    pub async fn on_intercept(&self, request: Request) -> Result<Response> {
        if request.is_cacheable_method() && self.is_precached_url(&request.url) {
            if let Some(response) = self.precached(&request).await {
                debug!(url = %request.url, "Served from precache");
                return Ok(response);
            }
        }

        let route = self.router.resolve(&request);
        self.engine.handle(&request, route).await
    }

    fn is_precached_url(&self, url: &str) -> bool {
        !self.precache_index.is_empty()
            && normalize_url(url)
                .map(|url| self.precache_index.contains(url.as_str()))
                .unwrap_or(false)
    }

    async fn precached(&self, request: &Request) -> Option<Response> {
        let fingerprint = Fingerprint::compute(request, &[]).ok()?;
        match self.store().get(&fingerprint, &self.precache_partition).await {
            Ok(entry) => entry.map(|entry| Response::from_entry(&entry, false)),
            Err(e) => {
                warn!("Precache read failed: {}", e);
                None
            }
        }
    }
}
