//! Network Module
//!
//! The outbound fetch capability the engine depends on, and its
//! reqwest-backed implementation.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::models::{HeaderList, Request, Response};

/// Hop-by-hop headers that must not be forwarded.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

// == Fetcher ==
/// Performs a network fetch for an intercepted request.
///
/// Any response received from the network, whatever its status, is a
/// success. Only transport failures are errors, reported as
/// `EngineError::NetworkUnavailable`.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

// == HTTP Fetcher ==
/// Forwards requests over HTTP with reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher whose connection attempts give up after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| EngineError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| EngineError::InvalidRequest(format!("bad method: {}", e)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            if name == "host" || name == "content-length" || is_hop_by_hop(name) {
                continue;
            }
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let upstream = builder
            .send()
            .await
            .map_err(|e| EngineError::NetworkUnavailable(e.to_string()))?;

        let status = upstream.status().as_u16();
        let mut response = Response::new(status, Vec::new());
        response.headers = forwardable_headers(upstream.headers());

        response.body = upstream
            .bytes()
            .await
            .map_err(|e| EngineError::NetworkUnavailable(e.to_string()))?
            .to_vec();

        debug!(url = %request.url, status, bytes = response.body.len(), "Network fetch complete");
        Ok(response)
    }
}

/// Copies end-to-end response headers, one pair per value so repeated
/// headers such as `set-cookie` survive.
fn forwardable_headers(headers: &reqwest::header::HeaderMap) -> HeaderList {
    headers
        .iter()
        .filter(|(name, _)| name.as_str() != "content-length" && !is_hop_by_hop(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_by_hop_detection() {
        assert!(is_hop_by_hop("connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(!is_hop_by_hop("accept"));
    }

    #[test]
    fn test_repeated_response_headers_are_kept() {
        use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};

        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(SET_COOKIE, HeaderValue::from_static("b=2"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("content-length", HeaderValue::from_static("12"));

        let forwarded = forwardable_headers(&headers);
        assert_eq!(
            forwarded,
            vec![
                ("set-cookie".to_string(), "a=1".to_string()),
                ("set-cookie".to_string(), "b=2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_unavailable() {
        let fetcher = HttpFetcher::new(Duration::from_millis(200)).unwrap();
        // Port 9 (discard) on localhost is closed in test environments
        let err = fetcher
            .fetch(&Request::get("http://127.0.0.1:9/"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NetworkUnavailable(_)));
    }

    #[tokio::test]
    async fn test_bad_method_rejected() {
        let fetcher = HttpFetcher::new(Duration::from_millis(200)).unwrap();
        let err = fetcher
            .fetch(&Request::new("BAD METHOD", "http://127.0.0.1:9/"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }
}
