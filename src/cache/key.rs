//! Cache key construction.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::cache::hash::HashSelector;

/// Lowercased `path:method[:body-digest]` string identifying a cacheable request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(25)
            .map_or(self.0.len(), |(idx, _)| idx);
        &self.0[..end]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds cache keys, digesting request bodies with the selected algorithm.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    selector: Arc<HashSelector>,
}

impl CacheKeyBuilder {
    pub fn new(selector: Arc<HashSelector>) -> Self {
        Self { selector }
    }

    pub fn selector(&self) -> &Arc<HashSelector> {
        &self.selector
    }

    /// Build the key for `(path, method, body)`.
    ///
    /// An absent or empty body yields `path:method`.
    pub fn build(&self, path: &str, method: &str, body: Option<&[u8]>) -> CacheKey {
        let key = match body {
            Some(body) if !body.is_empty() => {
                let digest = self.selector.select().hex_digest(body);
                format!("{}:{}:{}", path, method, digest)
            }
            _ => format!("{}:{}", path, method),
        };
        CacheKey(key.to_lowercase())
    }

    /// Same as [`build`](Self::build), digesting non-empty bodies on the blocking pool.
    pub async fn build_async(
        &self,
        path: &str,
        method: &str,
        body: &Bytes,
    ) -> Result<CacheKey, tokio::task::JoinError> {
        if body.is_empty() {
            return Ok(self.build(path, method, None));
        }

        let builder = self.clone();
        let path = path.to_string();
        let method = method.to_string();
        let body = body.clone();
        tokio::task::spawn_blocking(move || builder.build(&path, &method, Some(&body))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::hash::{HashAlgorithm, HashPolicy};

    fn builder() -> CacheKeyBuilder {
        CacheKeyBuilder::new(Arc::new(HashSelector::new(HashPolicy::Pinned(
            HashAlgorithm::Sha256,
        ))))
    }

    #[test]
    fn test_key_without_body() {
        let keys = builder();
        assert_eq!(keys.build("api/Tags", "GET", None).as_str(), "api/tags:get");
        assert_eq!(keys.build("api/tags", "GET", Some(b"")).as_str(), "api/tags:get");
    }

    #[test]
    fn test_key_with_body_digest() {
        let keys = builder();
        let key = keys.build("api/show", "POST", Some(b"abc"));
        assert_eq!(
            key.as_str(),
            "api/show:post:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_key_is_deterministic() {
        let keys = builder();
        let body = br#"{"model":"llama3"}"#;
        let a = keys.build("api/show", "POST", Some(body));
        let b = keys.build("api/show", "POST", Some(body));
        assert_eq!(a, b);

        let other = keys.build("api/show", "POST", Some(br#"{"model":"qwen"}"#));
        assert_ne!(a, other);
    }

    #[test]
    fn test_short_key() {
        let keys = builder();
        let key = keys.build("api/show", "POST", Some(b"abc"));
        assert_eq!(key.short().len(), 25);
        assert_eq!(keys.build("api/tags", "GET", None).short(), "api/tags:get");
    }

    #[tokio::test]
    async fn test_async_matches_sync_across_tasks() {
        let keys = builder();
        let body = Bytes::from_static(br#"{"model":"mistral"}"#);
        let expected = keys.build("api/show", "POST", Some(&body));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let keys = keys.clone();
            let body = body.clone();
            handles.push(tokio::spawn(async move {
                keys.build_async("api/show", "POST", &body).await.unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), expected);
        }
    }
}
