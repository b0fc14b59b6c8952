//! Intercepted request model
//!
//! The host-independent shape of a request handed to the engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A request captured by the host and passed to `on_intercept`.
///
/// Header names are stored lowercased so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Upper-case HTTP method
    pub method: String,
    /// Absolute URL
    pub url: String,
    /// Lowercased header name to value
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request body (empty for GET)
    #[serde(default)]
    pub body: Vec<u8>,
}

impl Request {
    /// Creates a request with the given method and URL.
    pub fn new(method: impl AsRef<str>, url: impl Into<String>) -> Self {
        Self {
            method: method.as_ref().to_ascii_uppercase(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    /// Shorthand for a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Adds a header, replacing any previous value.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Only GET requests are ever read from or written to the cache.
    pub fn is_cacheable_method(&self) -> bool {
        self.method == "GET"
    }
}
