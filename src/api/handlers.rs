//! API Handlers
//!
//! The interception proxy handler plus the admin endpoints.

use axum::{
    body::Body,
    extract::{Path, Request as HttpRequest, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response as HttpResponse},
    Json,
};
use tracing::debug;
use url::Url;

use crate::error::{EngineError, Result};
use crate::lifecycle::ServiceWorker;
use crate::models::{
    DeletePartitionResponse, HealthResponse, PartitionsResponse, Request, Response, StatsResponse,
};

/// Largest request body buffered for forwarding.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Response header reporting how a request was served.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub worker: ServiceWorker,
    /// Origin that intercepted paths are resolved against
    pub upstream: Url,
}

impl AppState {
    pub fn new(worker: ServiceWorker, upstream: Url) -> Self {
        Self { worker, upstream }
    }

    /// Creates a new AppState, parsing the upstream origin.
    pub fn from_config(worker: ServiceWorker, config: &crate::config::Config) -> Result<Self> {
        let upstream = Url::parse(&config.upstream_url).map_err(|e| {
            EngineError::Config(format!("invalid upstream URL '{}': {}", config.upstream_url, e))
        })?;
        Ok(Self::new(worker, upstream))
    }
}

/// Fallback handler: every request that is not an admin endpoint is
/// intercepted and answered by the worker.
pub async fn intercept_handler(
    State(state): State<AppState>,
    request: HttpRequest,
) -> Result<HttpResponse> {
    let request = to_engine_request(&state.upstream, request).await?;
    debug!(method = %request.method, url = %request.url, "Intercepted request");

    let response = state.worker.on_intercept(request).await?;
    Ok(to_http_response(response))
}

async fn to_engine_request(upstream: &Url, request: HttpRequest) -> Result<Request> {
    let (parts, body) = request.into_parts();

    // The intercepted path is appended to the upstream's base path
    let mut url = upstream.clone();
    let base = upstream.path().trim_end_matches('/');
    url.set_path(&format!("{}{}", base, parts.uri.path()));
    url.set_query(parts.uri.query());

    let mut intercepted = Request::new(parts.method.as_str(), url.to_string());
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            intercepted = intercepted.with_header(name.as_str(), value);
        }
    }

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| EngineError::InvalidRequest(format!("cannot read body: {}", e)))?;
    Ok(intercepted.with_body(body.to_vec()))
}

fn to_http_response(response: Response) -> HttpResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        if name == "content-length" || name == "transfer-encoding" {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers.insert(
        HeaderName::from_static(CACHE_STATUS_HEADER),
        HeaderValue::from_static(cache_status(&response)),
    );

    (status, headers, Body::from(response.body)).into_response()
}

/// `hit`, `stale` or `miss` (served from the network).
fn cache_status(response: &Response) -> &'static str {
    match (response.is_from_cache(), response.stale) {
        (true, true) => "stale",
        (true, false) => "hit",
        (false, _) => "miss",
    }
}

/// Handler for GET /__sw/health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(
        state.worker.state(),
        state.worker.store().backend_name(),
    ))
}

/// Handler for GET /__sw/stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let stats = state.worker.store().stats().await?;
    let pending = state.worker.replay_queue().len().await;
    Ok(Json(StatsResponse::new(stats, pending)))
}

/// Handler for GET /__sw/partitions
pub async fn partitions_handler(State(state): State<AppState>) -> Result<Json<PartitionsResponse>> {
    let mut partitions = state.worker.store().list_partitions().await?;
    partitions.sort();
    Ok(Json(PartitionsResponse { partitions }))
}

/// Handler for DELETE /__sw/partitions/:name
pub async fn delete_partition_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeletePartitionResponse>> {
    if !state.worker.store().delete_partition(&name).await? {
        return Err(EngineError::PartitionNotFound(name));
    }
    Ok(Json(DeletePartitionResponse::new(name)))
}
