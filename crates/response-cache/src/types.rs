//! Cache types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached response, keyed by its request signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub signature: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Response body exactly as received
    pub body: String,
    pub stored_at: DateTime<Utc>,
    /// `None` means the entry never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedResponse {
    /// Build an entry stored now that never expires; `ResponseCache::put` sets the real expiry
    pub fn new(
        signature: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
        status: u16,
        headers: Vec<(String, String)>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            signature: signature.into(),
            method: method.into(),
            url: url.into(),
            status,
            headers,
            body: body.into(),
            stored_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
}
