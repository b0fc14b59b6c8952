//! Cache Entry Module
//!
//! Defines the stored response artifact and its freshness metadata.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::Fingerprint;
use crate::models::{HeaderList, Response};
use crate::strategy::StrategyKind;

/// Process-wide insertion counter used to order entries stored in the same instant.
static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

// == Cache Entry ==
/// A stored response plus the metadata needed for freshness and eviction.
///
/// The body is not part of the serialized form: backends persist it
/// alongside the metadata in whatever layout suits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Lookup key within the partition
    pub fingerprint: Fingerprint,
    /// URL the response was fetched from
    pub url: String,
    /// HTTP status of the stored response
    pub status: u16,
    /// Response headers, repeated names included
    pub headers: HeaderList,
    /// Response body
    #[serde(skip)]
    pub body: Vec<u8>,
    /// When the response was stored
    pub stored_at: DateTime<Utc>,
    /// Strategy that stored the entry
    pub strategy: StrategyKind,
    /// Freshness window in seconds, None = never expires
    pub ttl: Option<u64>,
    /// Tie-breaker for entries with equal `stored_at`
    pub sequence: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry from a network response, stamped with the current time.
    pub fn from_response(
        fingerprint: Fingerprint,
        url: impl Into<String>,
        response: &Response,
        strategy: StrategyKind,
        ttl: Option<u64>,
    ) -> Self {
        Self {
            fingerprint,
            url: url.into(),
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            stored_at: Utc::now(),
            strategy,
            ttl,
            sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    // == Expiry ==
    /// Returns the instant after which the entry is expired, if it has a ttl.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.ttl.and_then(|ttl| {
            let ttl = Duration::try_seconds(i64::try_from(ttl).ok()?)?;
            self.stored_at.checked_add_signed(ttl)
        })
    }

    /// An entry is expired once `stored_at + ttl` lies strictly before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires) => expires < now,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Returns remaining freshness in seconds, or None if no ttl is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining)` if the entry is still fresh
    /// - `None` if the entry never expires
    pub fn ttl_remaining(&self) -> Option<u64> {
        self.expires_at().map(|expires| {
            let remaining = (expires - Utc::now()).num_seconds();
            u64::try_from(remaining).unwrap_or(0)
        })
    }

    // == Ordering ==
    /// Key ordering entries by insertion: oldest first.
    pub fn insertion_key(&self) -> (DateTime<Utc>, u64) {
        (self.stored_at, self.sequence)
    }

    /// Approximate storage footprint used for quota accounting.
    pub fn size_bytes(&self) -> u64 {
        let headers: usize = self.headers.iter().map(|(k, v)| k.len() + v.len()).sum();
        (self.body.len() + headers + self.url.len()) as u64
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ttl: Option<u64>) -> CacheEntry {
        let req = crate::models::Request::get("https://example.com/a");
        let fp = Fingerprint::compute(&req, &[]).unwrap();
        let resp = Response::new(200, "body").with_header("content-type", "text/plain");
        CacheEntry::from_response(fp, req.url, &resp, StrategyKind::CacheFirst, ttl)
    }

    #[test]
    fn test_entry_copies_response() {
        let entry = sample(Some(60));
        assert_eq!(entry.status, 200);
        assert_eq!(entry.body, b"body");
        assert_eq!(
            entry.headers,
            vec![("content-type".to_string(), "text/plain".to_string())]
        );
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_without_ttl_never_expires() {
        let mut entry = sample(None);
        entry.stored_at = Utc::now() - Duration::days(365);
        assert!(!entry.is_expired());
        assert!(entry.ttl_remaining().is_none());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let mut entry = sample(Some(10));
        let now = Utc::now();
        entry.stored_at = now - Duration::seconds(10);

        // stored_at + ttl == now is not yet expired
        assert!(!entry.is_expired_at(now));
        assert!(entry.is_expired_at(now + Duration::milliseconds(1)));
    }

    #[test]
    fn test_ttl_remaining_expired() {
        let mut entry = sample(Some(1));
        entry.stored_at = Utc::now() - Duration::seconds(5);
        assert_eq!(entry.ttl_remaining(), Some(0));
    }

    #[test]
    fn test_sequence_orders_same_instant() {
        let a = sample(None);
        let mut b = sample(None);
        b.stored_at = a.stored_at;
        assert!(a.insertion_key() < b.insertion_key());
    }
}
