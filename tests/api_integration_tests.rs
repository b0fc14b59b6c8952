//! Integration Tests for the HTTP Host Adapter
//!
//! Tests the full request/response cycle through the axum router: the
//! interception fallback and the admin endpoints.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{worker, ScriptedFetcher};
use offline_cache::{api::create_router, AppState, Config};
use serde_json::Value;
use tower::ServiceExt;

// == Helper Functions ==

fn create_test_app(routes: &str, fetcher: Arc<ScriptedFetcher>) -> Router {
    let state = AppState::from_config(worker(routes, fetcher), &Config::default()).unwrap();
    create_router(state)
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// == Interception Tests ==

#[tokio::test]
async fn test_cache_first_miss_then_hit() {
    let fetcher = ScriptedFetcher::new("hello");
    let app = create_test_app(
        r#"[{"match": {"prefix": "/static/"}, "strategy": "cache-first"}]"#,
        fetcher.clone(),
    );

    let response = app.clone().oneshot(get("/static/app.css")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-cache"], "miss");

    let response = app.oneshot(get("/static/app.css")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-cache"], "hit");
    assert_eq!(response.headers()["content-type"], "text/plain");
    assert_eq!(body_to_string(response.into_body()).await, "hello");
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_network_first_offline_is_marked_stale() {
    let fetcher = ScriptedFetcher::new(r#"{"items":[]}"#);
    let app = create_test_app(
        r#"[{"match": {"glob": "/api/*"}, "strategy": "network-first", "options": {"maxAgeSeconds": 60}}]"#,
        fetcher.clone(),
    );

    app.clone().oneshot(get("/api/items")).await.unwrap();
    fetcher.set_online(false);

    let response = app.oneshot(get("/api/items")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-cache"], "stale");
    assert_eq!(body_to_string(response.into_body()).await, r#"{"items":[]}"#);
}

#[tokio::test]
async fn test_cache_only_miss_is_service_unavailable() {
    let fetcher = ScriptedFetcher::new("unused");
    let app = create_test_app(
        r#"[{"match": {"prefix": "/"}, "strategy": "cache-only"}]"#,
        fetcher.clone(),
    );

    let response = app.oneshot(get("/offline.html")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_to_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("offline.html"));
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_cache_first_timeout_is_gateway_timeout() {
    let fetcher = ScriptedFetcher::new("slow");
    fetcher.set_delay(Duration::from_millis(300));
    let app = create_test_app(
        r#"[{"match": {"prefix": "/"}, "strategy": "cache-first", "options": {"networkTimeoutMs": 50}}]"#,
        fetcher,
    );

    let response = app.oneshot(get("/slow")).await.unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_upstream_status_is_passed_through() {
    let fetcher = ScriptedFetcher::new("not here");
    fetcher.set_status(404);
    let app = create_test_app("[]", fetcher);

    let response = app.oneshot(get("/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-cache"], "miss");
}

#[tokio::test]
async fn test_post_is_forwarded() {
    let fetcher = ScriptedFetcher::new("created");
    let app = create_test_app(
        r#"[{"match": {"prefix": "/"}, "strategy": "cache-first"}]"#,
        fetcher.clone(),
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/items")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"name":"a"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fetcher.calls(), 1);
}

// == Admin Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app("[]", ScriptedFetcher::new(""));

    let response = app.oneshot(get("/__sw/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["lifecycle"], "parsed");
    assert!(json.get("timestamp").is_some());
}

#[tokio::test]
async fn test_stats_endpoint_counts_hits_and_misses() {
    let fetcher = ScriptedFetcher::new("body");
    let app = create_test_app(
        r#"[{"match": {"prefix": "/"}, "strategy": "cache-first"}]"#,
        fetcher,
    );

    app.clone().oneshot(get("/a")).await.unwrap();
    app.clone().oneshot(get("/a")).await.unwrap();

    let response = app.oneshot(get("/__sw/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["hits"], 1);
    assert_eq!(json["misses"], 1);
    assert_eq!(json["writes"], 1);
    assert_eq!(json["total_entries"], 1);
    assert_eq!(json["partitions"]["runtime-v1"], 1);
    assert_eq!(json["replay_pending"], 0);
}

#[tokio::test]
async fn test_list_and_delete_partition() {
    let fetcher = ScriptedFetcher::new("body");
    let app = create_test_app(
        r#"[{"match": {"prefix": "/"}, "strategy": "cache-first", "options": {"cacheName": "pages"}}]"#,
        fetcher.clone(),
    );
    app.clone().oneshot(get("/index.html")).await.unwrap();

    let response = app.clone().oneshot(get("/__sw/partitions")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["partitions"], serde_json::json!(["pages-v1"]));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/__sw/partitions/pages-v1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["partition"], "pages-v1");

    // Gone from the cache, so the next request goes to the network
    let response = app.oneshot(get("/index.html")).await.unwrap();
    assert_eq!(response.headers()["x-cache"], "miss");
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_delete_unknown_partition_is_not_found() {
    let app = create_test_app("[]", ScriptedFetcher::new(""));

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/__sw/partitions/nothing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_to_json(response.into_body()).await;
    assert!(json.get("error").is_some());
}
