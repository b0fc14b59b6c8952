//! Engine response model

use serde::Serialize;

use crate::cache::CacheEntry;

/// Response headers in arrival order. Names are lowercased and may repeat
/// (`set-cookie`, `link`, `vary`).
pub type HeaderList = Vec<(String, String)>;

/// Where a response body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
}

/// A response returned by the engine to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    pub headers: HeaderList,
    /// Response body
    pub body: Vec<u8>,
    /// True when served from cache as a fallback after the network failed
    pub stale: bool,
    /// Origin of the body
    pub source: ResponseSource,
}

impl Response {
    /// Creates a network-sourced response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderList::new(),
            body: body.into(),
            stale: false,
            source: ResponseSource::Network,
        }
    }

    /// Appends a header. Earlier values under the same name are kept.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// First value of a header, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).next()
    }

    /// Every value of a header, in arrival order.
    pub fn header_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .filter(move |(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Rebuilds a response from a stored entry.
    pub fn from_entry(entry: &CacheEntry, stale: bool) -> Self {
        Self {
            status: entry.status,
            headers: entry.headers.clone(),
            body: entry.body.clone(),
            stale,
            source: ResponseSource::Cache,
        }
    }

    /// Returns true if served from the cache.
    pub fn is_from_cache(&self) -> bool {
        self.source == ResponseSource::Cache
    }
}
