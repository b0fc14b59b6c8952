//! swcache - caching proxy in front of an upstream origin
//!
//! Serves every request through the offline cache's routing table.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use offline_cache::cache::{FileBackend, MemoryBackend, StorageBackend};
use offline_cache::network::HttpFetcher;
use offline_cache::{
    create_router, spawn_eviction_task, spawn_replay_task, AppState, Config, ServiceWorker,
};

/// Main entry point for the caching proxy.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration and the route table
/// 3. Open the storage backend
/// 4. Install (precache) and activate (drop outdated partitions)
/// 5. Start background eviction and replay tasks
/// 6. Serve until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "offline_cache=info,swcache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting swcache");

    let config = Config::from_env();
    let routes = config.load_routes()?;
    info!(
        "Configuration loaded: upstream={}, routes={}, port={}, cache_version={}",
        config.upstream_url,
        routes.len(),
        config.server_port,
        config.cache_version
    );

    let backend: Arc<dyn StorageBackend> = match &config.storage_dir {
        Some(dir) => Arc::new(
            FileBackend::open(dir, config.storage_quota_bytes)
                .await
                .with_context(|| format!("opening storage at {}", dir.display()))?,
        ),
        None => match config.storage_quota_bytes {
            Some(quota) => Arc::new(MemoryBackend::with_quota(quota)),
            None => Arc::new(MemoryBackend::new()),
        },
    };
    info!("Storage backend: {}", backend.name());

    let fetcher = Arc::new(HttpFetcher::new(Duration::from_millis(
        config.default_network_timeout_ms,
    ))?);
    let worker = ServiceWorker::new(&config, &routes, backend, fetcher.clone())?;

    if let Err(e) = worker.on_install().await {
        warn!("Precache failed, serving without it: {}", e);
    }
    let deleted = worker.on_activate().await?;
    info!("Worker activated, {} outdated partitions removed", deleted.len());

    let tasks = vec![
        spawn_eviction_task(worker.eviction().clone(), config.cleanup_interval),
        spawn_replay_task(worker.replay_queue().clone(), fetcher, config.replay_interval),
    ];
    info!("Background tasks started");

    let app = create_router(AppState::from_config(worker, &config)?);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(tasks))
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then aborts the
/// background tasks.
async fn shutdown_signal(tasks: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    for task in tasks {
        task.abort();
    }
    warn!("Background tasks aborted");
}
