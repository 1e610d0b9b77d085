//! TTL-bounded LRU store for cached responses.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;

use crate::cache::key::CacheKey;

/// One cached upstream response. Immutable once stored.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub content: Bytes,
    pub status: StatusCode,
    /// Already filtered for downstream use.
    pub headers: HeaderMap,
}

impl CacheEntry {
    pub fn new(content: Bytes, status: Option<StatusCode>, headers: HeaderMap) -> Self {
        Self {
            content,
            status: status.unwrap_or(StatusCode::OK),
            headers,
        }
    }
}

impl IntoResponse for CacheEntry {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.content));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[derive(Debug)]
struct Slot {
    entry: Arc<CacheEntry>,
    inserted_at: Instant,
}

/// Bounded, expiring map from [`CacheKey`] to [`CacheEntry`].
///
/// A single mutex guards the map; it is never held across I/O.
#[derive(Debug)]
pub struct TtlCache {
    inner: Mutex<LruCache<CacheKey, Slot>>,
    ttl: Duration,
}

impl TtlCache {
    pub fn new(max_entries: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(max_entries)),
            ttl,
        }
    }

    /// Number of physically stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, slot: &Slot, now: Instant) -> bool {
        now.duration_since(slot.inserted_at) >= self.ttl
    }

    /// Look up a live entry, marking it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let now = Instant::now();
        let mut cache = self.inner.lock();
        let expired = match cache.get(key) {
            Some(slot) if !self.is_expired(slot, now) => return Some(slot.entry.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.pop(key);
        }
        None
    }

    /// Store `entry` unless a live entry already exists for `key`.
    ///
    /// Returns true if the entry was stored. Inserting into a full store
    /// evicts the least recently used entry.
    pub fn insert_if_absent(&self, key: CacheKey, entry: CacheEntry) -> bool {
        let now = Instant::now();
        let mut cache = self.inner.lock();
        if let Some(slot) = cache.peek(&key) {
            if !self.is_expired(slot, now) {
                return false;
            }
        }
        cache.put(
            key,
            Slot {
                entry: Arc::new(entry),
                inserted_at: now,
            },
        );
        true
    }

    /// Physically drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut cache = self.inner.lock();
        let expired: Vec<CacheKey> = cache
            .iter()
            .filter(|(_, slot)| self.is_expired(slot, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            cache.pop(key);
        }
        expired.len()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
