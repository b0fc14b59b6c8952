//! Request Fingerprint Module
//!
//! Derives the cache lookup key for a request from its method, normalized URL
//! and the values of the configured vary headers.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{EngineError, Result};
use crate::models::Request;

// == Fingerprint ==
/// SHA-256 hex digest identifying a request within a cache partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a request.
    ///
    /// Header values are looked up case-insensitively; an absent header
    /// contributes an empty value so that its absence is still part of the key.
    pub fn compute(request: &Request, vary_headers: &[String]) -> Result<Self> {
        let url = normalize_url(&request.url)?;

        let mut hasher = Sha256::new();
        hasher.update(request.method.as_bytes());
        hasher.update(b"\n");
        hasher.update(url.as_str().as_bytes());
        for name in vary_headers {
            hasher.update(b"\n");
            hasher.update(name.to_ascii_lowercase().as_bytes());
            hasher.update(b":");
            hasher.update(request.header(name).unwrap_or_default().as_bytes());
        }

        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Wraps an existing hex digest, rejecting anything that is not one.
    pub fn from_hex(value: &str) -> Option<Self> {
        let valid = value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit());
        valid.then(|| Self(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// == URL Normalization ==
/// Parses and normalizes a request URL.
///
/// Scheme and host are lowercased and default ports dropped by the parser;
/// the fragment is removed and query pairs are sorted.
pub fn normalize_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)
        .map_err(|e| EngineError::InvalidRequest(format!("cannot parse URL '{}': {}", raw, e)))?;

    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        pairs.sort();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    Ok(url)
}
