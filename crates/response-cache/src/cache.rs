//! Response cache with an in-memory index and optional directory persistence

use crate::error::Result;
use crate::expiration::{Expiration, ExpirationPolicy, UrlPattern};
use crate::types::{CacheStats, CachedResponse};
use chrono::Utc;
use moka::future::Cache;
use moka::notification::RemovalCause;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

const MAX_ENTRIES: u64 = 100_000;

/// A response cache keyed by request signature
///
/// Expiration is checked when an entry is read. Expired entries are never returned by
/// [`get`](Self::get) but stay available to [`get_stale`](Self::get_stale) until they are
/// replaced, invalidated, evicted for space or removed by [`purge_expired`](Self::purge_expired).
pub struct ResponseCache {
    entries: Cache<String, Arc<CachedResponse>>,
    /// Directory holding one JSON file per entry, if persistent
    cache_dir: Option<PathBuf>,
    policy: ExpirationPolicy,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Create a cache that lives only in memory
    pub fn in_memory(policy: ExpirationPolicy) -> Self {
        Self::build(policy, None, MAX_ENTRIES)
    }

    /// Open a persistent cache in `cache_dir`, loading every stored entry
    pub async fn open(cache_dir: impl Into<PathBuf>, policy: ExpirationPolicy) -> Result<Self> {
        Self::open_with_capacity(cache_dir.into(), policy, MAX_ENTRIES).await
    }

    async fn open_with_capacity(
        cache_dir: PathBuf,
        policy: ExpirationPolicy,
        capacity: u64,
    ) -> Result<Self> {
        fs::create_dir_all(&cache_dir).await?;

        let cache = Self::build(policy, Some(cache_dir.clone()), capacity);
        let mut loaded = 0usize;
        let mut dir = fs::read_dir(&cache_dir).await?;
        while let Some(file) = dir.next_entry().await? {
            let path = file.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_entry(&path).await {
                Ok(entry) => {
                    cache
                        .entries
                        .insert(entry.signature.clone(), Arc::new(entry))
                        .await;
                    loaded += 1;
                }
                Err(e) => {
                    warn!(path = ?path, error = %e, "Unreadable cache entry, removing");
                    let _ = fs::remove_file(&path).await;
                }
            }
        }

        info!(cache_dir = ?cache_dir, loaded, "Cache initialized");
        Ok(cache)
    }

    fn build(policy: ExpirationPolicy, cache_dir: Option<PathBuf>, capacity: u64) -> Self {
        let mut builder = Cache::builder().max_capacity(capacity);
        if let Some(dir) = cache_dir.clone() {
            // Entries dropped for space take their file with them
            builder = builder.eviction_listener(move |key: Arc<String>, _, cause| {
                if cause == RemovalCause::Size {
                    let _ = std::fs::remove_file(entry_path(&dir, &key));
                }
            });
        }

        Self {
            entries: builder.build(),
            cache_dir,
            policy,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &ExpirationPolicy {
        &self.policy
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Look up an unexpired entry
    pub async fn get(&self, signature: &str) -> Option<Arc<CachedResponse>> {
        if let Some(entry) = self.entries.get(signature).await {
            if !entry.is_expired() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %signature, url = %entry.url, "Cache hit");
                return Some(entry);
            }
            debug!(key = %signature, url = %entry.url, "Cache entry expired");
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Look up an entry whether or not it has expired.
    ///
    /// For serving an old response when a fresh one can't be fetched.
    pub async fn get_stale(&self, signature: &str) -> Option<Arc<CachedResponse>> {
        let entry = self.entries.get(signature).await?;
        debug!(key = %signature, url = %entry.url, expired = entry.is_expired(), "Stale cache lookup");
        Some(entry)
    }

    /// Remove every expired entry, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.as_ref().clone())
            .collect();

        for signature in &expired {
            self.remove(signature).await;
        }
        if !expired.is_empty() {
            debug!(removed = expired.len(), "Purged expired entries");
        }
        expired.len()
    }

    /// Store an entry using the policy's expiration for its URL.
    ///
    /// Returns `false` when the policy says not to cache it.
    pub async fn put(&self, entry: CachedResponse) -> Result<bool> {
        let expiration = self.policy.expiration_for(&entry.url);
        self.put_with_expiration(entry, expiration).await
    }

    /// Store an entry with an explicit expiration, replacing any existing entry
    pub async fn put_with_expiration(
        &self,
        mut entry: CachedResponse,
        expiration: Expiration,
    ) -> Result<bool> {
        if !expiration.is_cacheable() {
            // A response that must not be cached still invalidates what was cached before
            self.remove(&entry.signature).await;
            return Ok(false);
        }

        entry.stored_at = Utc::now();
        entry.expires_at = expiration.expires_at(entry.stored_at);

        if let Some(dir) = &self.cache_dir {
            let path = entry_path(dir, &entry.signature);
            let tmp_path = path.with_extension("tmp");
            fs::write(&tmp_path, serde_json::to_vec(&entry)?).await?;
            fs::rename(&tmp_path, &path).await?;
        }

        debug!(key = %entry.signature, url = %entry.url, expires_at = ?entry.expires_at, "Cached response");
        self.entries
            .insert(entry.signature.clone(), Arc::new(entry))
            .await;
        Ok(true)
    }

    /// Remove a single entry
    pub async fn invalidate(&self, signature: &str) {
        self.remove(signature).await;
    }

    /// Remove every entry
    pub async fn invalidate_all(&self) -> Result<()> {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;

        if let Some(dir) = &self.cache_dir {
            let mut files = fs::read_dir(dir).await?;
            while let Some(file) = files.next_entry().await? {
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    fs::remove_file(&path).await?;
                }
            }
        }
        info!("Cleared response cache");
        Ok(())
    }

    /// Remove every entry whose URL matches a glob pattern, returning how many were removed
    pub async fn invalidate_matching(&self, url_pattern: &str) -> Result<usize> {
        let pattern = UrlPattern::new(url_pattern)?;
        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| pattern.matches(&entry.url))
            .map(|(key, _)| key.as_ref().clone())
            .collect();

        for signature in &matching {
            self.remove(signature).await;
        }
        debug!(pattern = %url_pattern, removed = matching.len(), "Invalidated matching entries");
        Ok(matching.len())
    }

    /// Get current cache statistics
    pub async fn stats(&self) -> CacheStats {
        self.entries.run_pending_tasks().await;
        CacheStats {
            entries: self.entries.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    async fn remove(&self, signature: &str) {
        self.entries.remove(signature).await;
        if let Some(dir) = &self.cache_dir {
            // Missing files are fine; the entry may never have been persisted
            let _ = fs::remove_file(entry_path(dir, signature)).await;
        }
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("cache_dir", &self.cache_dir)
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

fn entry_path(dir: &Path, signature: &str) -> PathBuf {
    dir.join(format!("{signature}.json"))
}

async fn read_entry(path: &Path) -> Result<CachedResponse> {
    let bytes = fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
