//! Strategy Engine
//!
//! Executes the caching strategy selected for a request, consulting and
//! updating the cache store and the network.
//!
//! Background work (the continuation of a timed-out network-first fetch and
//! stale-while-revalidate refreshes) runs on detached tasks. Its only
//! observable effect is on the cache store; failures there are logged and
//! never reach the caller.

use std::sync::Arc;

use tokio::task::JoinError;
use tracing::{debug, warn, Instrument};

use crate::cache::{CacheEntry, CacheStore, EvictionManager, Fingerprint};
use crate::error::{EngineError, Result};
use crate::models::{Request, Response};
use crate::network::Fetcher;
use crate::replay::ReplayQueue;
use crate::router::RoutePattern;
use crate::strategy::{StrategyConfig, StrategyKind};

// == Strategy Engine ==
/// Cloning is cheap; clones share the store, fetcher and replay queue.
#[derive(Clone)]
pub struct StrategyEngine {
    eviction: EvictionManager,
    fetcher: Arc<dyn Fetcher>,
    replay: ReplayQueue,
    vary_headers: Arc<[String]>,
}

impl StrategyEngine {
    pub fn new(
        eviction: EvictionManager,
        fetcher: Arc<dyn Fetcher>,
        replay: ReplayQueue,
        vary_headers: Vec<String>,
    ) -> Self {
        Self {
            eviction,
            fetcher,
            replay,
            vary_headers: vary_headers.into(),
        }
    }

    pub fn store(&self) -> &CacheStore {
        self.eviction.store()
    }

    pub fn eviction(&self) -> &EvictionManager {
        &self.eviction
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    pub fn replay_queue(&self) -> &ReplayQueue {
        &self.replay
    }

    /// Computes the cache key of a request using the configured vary headers.
    pub fn fingerprint(&self, request: &Request) -> Result<Fingerprint> {
        Fingerprint::compute(request, &self.vary_headers)
    }

    // == Handle ==
    /// Runs the route's strategy for one request.
    ///
    /// Only GET requests touch the cache. Other methods are forwarded to the
    /// network, except under cache-only where they are unavailable.
    pub async fn handle(&self, request: &Request, route: &RoutePattern) -> Result<Response> {
        let strategy = route.strategy;
        let config = &route.config;

        if !request.is_cacheable_method() {
            if strategy == StrategyKind::CacheOnly {
                return Err(EngineError::ResourceUnavailable(format!(
                    "{} {} cannot be served from cache",
                    request.method, request.url
                )));
            }
            return self.network_only(request, config).await;
        }

        debug!(route = %route.name, strategy = %strategy, url = %request.url, "Handling request");

        match strategy {
            StrategyKind::NetworkOnly => self.network_only(request, config).await,
            StrategyKind::CacheFirst => {
                let fingerprint = self.fingerprint(request)?;
                self.cache_first(request, &fingerprint, config).await
            }
            StrategyKind::NetworkFirst => {
                let fingerprint = self.fingerprint(request)?;
                self.network_first(request, fingerprint, strategy, config).await
            }
            StrategyKind::StaleWhileRevalidate => {
                let fingerprint = self.fingerprint(request)?;
                self.stale_while_revalidate(request, fingerprint, config).await
            }
            StrategyKind::CacheOnly => {
                let fingerprint = self.fingerprint(request)?;
                self.cache_only(request, &fingerprint, config).await
            }
        }
    }

    // == Cache First ==
    async fn cache_first(
        &self,
        request: &Request,
        fingerprint: &Fingerprint,
        config: &StrategyConfig,
    ) -> Result<Response> {
        if let Some(entry) = self.lookup(fingerprint, config).await {
            debug!(url = %request.url, "Cache hit");
            return Ok(Response::from_entry(&entry, false));
        }

        debug!(url = %request.url, "Cache miss, fetching from network");
        let response = self.fetch_bounded(request, config).await?;
        self.store_response(fingerprint, StrategyKind::CacheFirst, config, &request.url, &response)
            .await;
        Ok(response)
    }

    // == Network First ==
    /// The network attempt runs on its own task so that, when the timeout
    /// elapses first, it keeps going and still refreshes the cache.
    async fn network_first(
        &self,
        request: &Request,
        fingerprint: Fingerprint,
        strategy: StrategyKind,
        config: &StrategyConfig,
    ) -> Result<Response> {
        let engine = self.clone();
        let task_request = request.clone();
        let task_fingerprint = fingerprint.clone();
        let task_config = config.clone();
        let span = tracing::debug_span!("network_fetch", url = %request.url);

        let fetch = tokio::spawn(
            async move {
                let response = engine.fetcher.fetch(&task_request).await?;
                engine
                    .store_response(
                        &task_fingerprint,
                        strategy,
                        &task_config,
                        &task_request.url,
                        &response,
                    )
                    .await;
                Ok::<_, EngineError>(response)
            }
            .instrument(span),
        );

        let outcome = match config.network_timeout_ms {
            Some(limit_ms) => {
                let limit = std::time::Duration::from_millis(limit_ms);
                match tokio::time::timeout(limit, fetch).await {
                    Ok(joined) => flatten_join(joined),
                    Err(_) => {
                        debug!(url = %request.url, limit_ms, "Network timed out, continuing in background");
                        Err(EngineError::NetworkTimeout(limit_ms))
                    }
                }
            }
            None => flatten_join(fetch.await),
        };

        match outcome {
            Ok(response) => Ok(response),
            Err(error) => {
                debug!(url = %request.url, %error, "Network attempt failed, falling back to cache");
                match self.lookup(&fingerprint, config).await {
                    Some(entry) => Ok(Response::from_entry(&entry, true)),
                    None => Err(EngineError::ResourceUnavailable(format!(
                        "{} ({})",
                        request.url, error
                    ))),
                }
            }
        }
    }

    // == Stale While Revalidate ==
    async fn stale_while_revalidate(
        &self,
        request: &Request,
        fingerprint: Fingerprint,
        config: &StrategyConfig,
    ) -> Result<Response> {
        match self.lookup(&fingerprint, config).await {
            Some(entry) => {
                self.spawn_revalidation(request.clone(), fingerprint, config.clone());
                Ok(Response::from_entry(&entry, false))
            }
            None => {
                self.network_first(request, fingerprint, StrategyKind::StaleWhileRevalidate, config)
                    .await
            }
        }
    }

    fn spawn_revalidation(&self, request: Request, fingerprint: Fingerprint, config: StrategyConfig) {
        let engine = self.clone();
        let span = tracing::debug_span!("revalidate", url = %request.url);
        tokio::spawn(
            async move {
                match engine.fetcher.fetch(&request).await {
                    Ok(response) => {
                        engine
                            .store_response(
                                &fingerprint,
                                StrategyKind::StaleWhileRevalidate,
                                &config,
                                &request.url,
                                &response,
                            )
                            .await;
                        debug!("Revalidation complete");
                    }
                    Err(e) => warn!("Background revalidation failed: {}", e),
                }
            }
            .instrument(span),
        );
    }

    // == Cache Only ==
    async fn cache_only(
        &self,
        request: &Request,
        fingerprint: &Fingerprint,
        config: &StrategyConfig,
    ) -> Result<Response> {
        self.lookup(fingerprint, config)
            .await
            .map(|entry| Response::from_entry(&entry, false))
            .ok_or_else(|| EngineError::ResourceUnavailable(request.url.clone()))
    }

    // == Network Only ==
    async fn network_only(&self, request: &Request, config: &StrategyConfig) -> Result<Response> {
        match self.fetch_bounded(request, config).await {
            Ok(response) => Ok(response),
            Err(error) => {
                let network_failure = matches!(
                    error,
                    EngineError::NetworkUnavailable(_) | EngineError::NetworkTimeout(_)
                );
                if network_failure && config.replay_failed_writes && !request.is_cacheable_method() {
                    self.replay.enqueue(request.clone()).await;
                }
                Err(error)
            }
        }
    }

    // == Helpers ==
    /// Reads the cache, treating storage failures as a miss.
    async fn lookup(&self, fingerprint: &Fingerprint, config: &StrategyConfig) -> Option<CacheEntry> {
        match self.store().get(fingerprint, &config.cache_name).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(partition = %config.cache_name, "Cache read failed, treating as miss: {}", e);
                None
            }
        }
    }

    /// Fetches from the network, bounded by the route timeout when one is set.
    async fn fetch_bounded(&self, request: &Request, config: &StrategyConfig) -> Result<Response> {
        match config.network_timeout_ms {
            Some(limit_ms) => {
                let limit = std::time::Duration::from_millis(limit_ms);
                tokio::time::timeout(limit, self.fetcher.fetch(request))
                    .await
                    .map_err(|_| EngineError::NetworkTimeout(limit_ms))?
            }
            None => self.fetcher.fetch(request).await,
        }
    }

    /// Stores a network response. Failures are logged, never returned.
    async fn store_response(
        &self,
        fingerprint: &Fingerprint,
        strategy: StrategyKind,
        config: &StrategyConfig,
        url: &str,
        response: &Response,
    ) {
        if !config.is_cacheable_status(response.status) {
            debug!(url, status = response.status, "Response status not cacheable");
            return;
        }

        let entry = CacheEntry::from_response(
            fingerprint.clone(),
            url,
            response,
            strategy,
            config.max_age_seconds,
        );
        if let Err(e) = self
            .eviction
            .store_entry(fingerprint, &config.cache_name, entry)
            .await
        {
            warn!(url, partition = %config.cache_name, "Failed to cache response: {}", e);
        }
    }
}

fn flatten_join(joined: std::result::Result<Result<Response>, JoinError>) -> Result<Response> {
    joined.unwrap_or_else(|e| Err(EngineError::NetworkUnavailable(format!("network task failed: {}", e))))
}
