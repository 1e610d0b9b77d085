//! Response caching subsystem.
//!
//! # Data Flow
//! ```text
//! Request (path, method, body)
//!     → is_cached(path)? no → bypass (store never touched)
//!     → key.rs (path:method[:digest], digest chosen by hash.rs)
//!     → store.rs lookup
//!         hit  → cached content, status, filtered headers
//!         miss → buffered upstream fetch (decoded)
//!              → 2xx? insert_if_absent
//! ```
//!
//! # Design Decisions
//! - Only read-mostly model endpoints are cacheable
//! - Cached responses are always fetched decoded so entries are encoding-free
//! - Concurrent misses for one key all fetch; the first insert wins
//! - Error responses are relayed but never stored

pub mod hash;
pub mod key;
pub mod store;

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::sync::broadcast;

use crate::config::CacheConfig;
use crate::observability::metrics;
use crate::upstream::BufferedResponse;

pub use hash::{HashAlgorithm, HashPolicy, HashSelector};
pub use key::{CacheKey, CacheKeyBuilder};
pub use store::{CacheEntry, TtlCache};

/// Path prefixes eligible for caching (model listing, metadata, detail).
pub const CACHED_PATHS: [&str; 3] = ["api/tags", "api/models", "api/show"];

/// Allow-listed response cache in front of the forwarder.
#[derive(Debug)]
pub struct ResponseCache {
    store: TtlCache,
    keys: CacheKeyBuilder,
}

impl ResponseCache {
    pub fn new(store: TtlCache, keys: CacheKeyBuilder) -> Self {
        Self { store, keys }
    }

    /// Build the cache described by `config`, sharing `selector` for key digests.
    pub fn from_config(config: &CacheConfig, selector: Arc<HashSelector>) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self::new(
            TtlCache::new(capacity, Duration::from_secs(config.ttl_secs)),
            CacheKeyBuilder::new(selector),
        )
    }

    pub fn store(&self) -> &TtlCache {
        &self.store
    }

    pub fn keys(&self) -> &CacheKeyBuilder {
        &self.keys
    }

    /// Whether responses for `path` may be cached.
    pub fn is_cached(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/').to_lowercase();
        CACHED_PATHS.iter().any(|prefix| path.starts_with(prefix))
    }

    /// Cached entry for `key`; always absent for non-cacheable paths.
    pub fn get(&self, path: &str, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        if !self.is_cached(path) {
            return None;
        }
        let entry = self.store.get(key);
        if entry.is_some() {
            tracing::debug!(key = %key.short(), "Cache hit");
        }
        entry
    }

    /// Store `entry` under `key` unless one is already live. No-op for non-cacheable paths.
    pub fn set(&self, path: &str, key: CacheKey, entry: CacheEntry) -> bool {
        if !self.is_cached(path) {
            return false;
        }
        let short = key.short().to_string();
        let stored = self.store.insert_if_absent(key, entry);
        if stored {
            tracing::debug!(key = %short, "Cache set");
        }
        stored
    }

    /// Serve `path` from the cache, or fetch it with `fetch` and cache a 2xx result.
    ///
    /// Returns `None` when the path is not cacheable (or no key could be built),
    /// leaving the request to the regular forwarding path.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        path: &str,
        method: &Method,
        body: &Bytes,
        fetch: F,
    ) -> Option<Response>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BufferedResponse>,
    {
        if !self.is_cached(path) {
            return None;
        }

        let key = match self.keys.build_async(path, method.as_str(), body).await {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Cache key task failed, bypassing cache");
                return None;
            }
        };

        if let Some(entry) = self.get(path, &key) {
            metrics::record_cache_lookup(true);
            return Some(CacheEntry::clone(&entry).into_response());
        }
        metrics::record_cache_lookup(false);

        let response = fetch().await;
        if response.status.is_success() {
            let entry = CacheEntry::new(
                response.body.clone(),
                Some(response.status),
                response.headers.clone(),
            );
            self.set(path, key, entry);
        }
        Some(response.into_response())
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// Periodically purge expired entries until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = self.store.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, remaining = self.store.len(), "Purged expired cache entries");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Cache sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn response_cache(ttl: Duration) -> ResponseCache {
        ResponseCache::new(
            TtlCache::new(NonZeroUsize::new(16).unwrap(), ttl),
            CacheKeyBuilder::new(Arc::new(HashSelector::new(HashPolicy::Pinned(
                HashAlgorithm::Sha256,
            )))),
        )
    }

    fn reply(status: StatusCode, body: &'static str) -> BufferedResponse {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        BufferedResponse {
            status,
            headers,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn test_allow_list() {
        let cache = response_cache(Duration::from_secs(60));
        assert!(cache.is_cached("api/tags"));
        assert!(cache.is_cached("/API/Show"));
        assert!(cache.is_cached("api/models/llama3"));
        assert!(!cache.is_cached("api/generate"));
        assert!(!cache.is_cached("v1/chat/completions"));
    }

    #[test]
    fn test_non_cacheable_path_is_noop() {
        let cache = response_cache(Duration::from_secs(60));
        let key = cache.keys().build("api/generate", "POST", None);
        let entry = CacheEntry::new(Bytes::from_static(b"x"), None, HeaderMap::new());

        assert!(!cache.set("api/generate", key.clone(), entry));
        assert!(cache.get("api/generate", &key).is_none());
        assert!(cache.store().is_empty());
    }

    #[tokio::test]
    async fn test_second_lookup_served_from_cache() {
        let cache = response_cache(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        let body = Bytes::new();

        for _ in 0..2 {
            let response = cache
                .get_or_fetch("api/tags", &Method::GET, &body, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    reply(StatusCode::OK, r#"{"models":[]}"#)
                })
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers().get("content-type").unwrap(), "application/json");
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(bytes, Bytes::from_static(br#"{"models":[]}"#));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_responses_not_cached() {
        let cache = response_cache(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        let body = Bytes::from_static(br#"{"model":"missing"}"#);

        for _ in 0..2 {
            let response = cache
                .get_or_fetch("api/show", &Method::POST, &body, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    reply(StatusCode::NOT_FOUND, r#"{"error":"model not found"}"#)
                })
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_cacheable_path_bypasses() {
        let cache = response_cache(Duration::from_secs(60));
        let response = cache
            .get_or_fetch("api/chat", &Method::POST, &Bytes::new(), || async {
                reply(StatusCode::OK, "unused")
            })
            .await;
        assert!(response.is_none());
        assert!(cache.store().is_empty());
    }
}
