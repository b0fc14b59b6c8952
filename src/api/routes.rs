//! API Routes
//!
//! Configures the Axum router: admin endpoints under `/__sw/` and the
//! interception fallback for everything else.

use axum::{
    routing::{delete, get},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::{
    delete_partition_handler, health_handler, intercept_handler, partitions_handler,
    stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /__sw/health` - Health check and lifecycle state
/// - `GET /__sw/stats` - Cache statistics
/// - `GET /__sw/partitions` - List partitions
/// - `DELETE /__sw/partitions/:name` - Drop a partition
/// - anything else - intercepted and served through the routing table
///
/// # Middleware
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/__sw/health", get(health_handler))
        .route("/__sw/stats", get(stats_handler))
        .route("/__sw/partitions", get(partitions_handler))
        .route("/__sw/partitions/:name", delete(delete_partition_handler))
        .fallback(intercept_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
