//! Path prefix normalization.
//!
//! # Responsibilities
//! - Keep paths whose first segment is a known API prefix (`api`, `v1`)
//! - Move everything else under the fallback prefix (`v1/...`)
//!
//! # Design Decisions
//! - Prefix comparison is exact and case-sensitive, like upstream routing
//! - The empty root path is left alone
//! - Unchanged paths are borrowed, never reallocated

use std::borrow::Cow;

/// Maps client paths onto prefixes the upstream understands.
#[derive(Debug, Clone)]
pub struct PrefixNormalizer {
    prefixes: Vec<String>,
    fallback: String,
}

impl PrefixNormalizer {
    pub fn new(prefixes: Vec<String>, fallback: impl Into<String>) -> Self {
        let fallback = fallback.into().trim_matches('/').to_string();
        let prefixes = prefixes
            .into_iter()
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { prefixes, fallback }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    fn is_compatible(&self, segment: &str) -> bool {
        segment == self.fallback || self.prefixes.iter().any(|p| p == segment)
    }

    /// Normalize a path given without its leading slash.
    pub fn normalize<'a>(&self, path: &'a str) -> Cow<'a, str> {
        if path.is_empty() {
            return Cow::Borrowed(path);
        }

        let first = path.split('/').next().unwrap_or_default();
        if self.is_compatible(first) {
            Cow::Borrowed(path)
        } else {
            tracing::debug!(path = %path, fallback = %self.fallback, "Rewriting unrecognized path prefix");
            Cow::Owned(format!("{}/{}", self.fallback, path))
        }
    }
}

impl Default for PrefixNormalizer {
    fn default() -> Self {
        Self::new(vec!["api".to_string(), "v1".to_string()], "v1")
    }
}
