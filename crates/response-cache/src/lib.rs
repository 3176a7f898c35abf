//! Response cache for API clients
//!
//! Stores response bodies keyed by a request signature (a SHA-256 digest of the method, URL
//! and normalized parameters), with an in-memory index and optional persistence to a
//! directory. How long each entry lives is decided by an [`ExpirationPolicy`] built from
//! ordered URL glob patterns.

mod cache;
mod error;
mod expiration;
mod signature;
mod types;

pub use cache::ResponseCache;
pub use error::{CacheError, Result};
pub use expiration::{Expiration, ExpirationPolicy, UrlPattern};
pub use signature::{request_signature, IGNORED_PARAMS};
pub use types::{CacheStats, CachedResponse};
