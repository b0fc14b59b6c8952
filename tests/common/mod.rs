//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use offline_cache::cache::{MemoryBackend, StorageBackend};
use offline_cache::config::parse_routes;
use offline_cache::models::{Request, Response};
use offline_cache::network::Fetcher;
use offline_cache::{Config, EngineError, Result, ServiceWorker};

#[derive(Debug, Clone)]
struct Script {
    body: String,
    status: u16,
    delay: Duration,
    online: bool,
}

/// Fake network whose answer, latency and availability can be changed
/// between calls. Counts every fetch it receives.
#[derive(Debug)]
pub struct ScriptedFetcher {
    calls: AtomicUsize,
    script: Mutex<Script>,
}

impl ScriptedFetcher {
    pub fn new(body: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(Script {
                body: body.to_string(),
                status: 200,
                delay: Duration::ZERO,
                online: true,
            }),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_body(&self, body: &str) {
        self.script.lock().unwrap().body = body.to_string();
    }

    pub fn set_status(&self, status: u16) {
        self.script.lock().unwrap().status = status;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.script.lock().unwrap().delay = delay;
    }

    pub fn set_online(&self, online: bool) {
        self.script.lock().unwrap().online = online;
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, _request: &Request) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap().clone();

        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }
        if !script.online {
            return Err(EngineError::NetworkUnavailable("offline".to_string()));
        }
        Ok(Response::new(script.status, script.body).with_header("content-type", "text/plain"))
    }
}

/// Builds a worker over an in-memory store with the given JSON route table.
pub fn worker(routes: &str, fetcher: Arc<ScriptedFetcher>) -> ServiceWorker {
    worker_with(&Config::default(), routes, Arc::new(MemoryBackend::new()), fetcher)
}

pub fn worker_with(
    config: &Config,
    routes: &str,
    backend: Arc<dyn StorageBackend>,
    fetcher: Arc<ScriptedFetcher>,
) -> ServiceWorker {
    let routes = parse_routes(routes).unwrap();
    ServiceWorker::new(config, &routes, backend, fetcher).unwrap()
}

pub fn body_text(response: &Response) -> String {
    String::from_utf8(response.body.clone()).unwrap()
}
