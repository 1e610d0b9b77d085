//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities > 0, addresses parse)
//! - Check the upstream URL and hash algorithm name
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderName;
use url::Url;

use crate::cache::HashPolicy;
use crate::config::schema::ProxyConfig;

/// A single semantic configuration problem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("upstream.url is required")]
    MissingUpstreamUrl,

    #[error("upstream.url '{0}' is not a valid http(s) URL")]
    InvalidUpstreamUrl(String),

    #[error("upstream.auth_header '{0}' is not a valid header name")]
    InvalidAuthHeader(String),

    #[error("upstream.max_connections must be greater than zero")]
    ZeroConnections,

    #[error("listener.bind_address '{0}' is not a valid socket address")]
    InvalidBindAddress(String),

    #[error("cache.max_entries must be greater than zero")]
    ZeroCacheEntries,

    #[error("cache.ttl_secs must be greater than zero")]
    ZeroCacheTtl,

    #[error("cache.hash_algorithm '{0}' is not 'auto' or an available algorithm")]
    UnknownHashAlgorithm(String),

    #[error("forwarding.fallback_prefix must not be empty")]
    EmptyFallbackPrefix,

    #[error("observability.log_level '{0}' is not a valid level")]
    InvalidLogLevel(String),
}

/// Validate a fully assembled configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.upstream.url.as_deref().map(str::trim) {
        None | Some("") => errors.push(ValidationError::MissingUpstreamUrl),
        Some(raw) => match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
            _ => errors.push(ValidationError::InvalidUpstreamUrl(raw.to_string())),
        },
    }

    if HeaderName::from_bytes(config.upstream.auth_header.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidAuthHeader(
            config.upstream.auth_header.clone(),
        ));
    }

    if config.upstream.max_connections == 0 {
        errors.push(ValidationError::ZeroConnections);
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.cache.enabled {
        if config.cache.max_entries == 0 {
            errors.push(ValidationError::ZeroCacheEntries);
        }
        if config.cache.ttl_secs == 0 {
            errors.push(ValidationError::ZeroCacheTtl);
        }
    }

    if config.cache.hash_algorithm.parse::<HashPolicy>().is_err() {
        errors.push(ValidationError::UnknownHashAlgorithm(
            config.cache.hash_algorithm.clone(),
        ));
    }

    if config.forwarding.fallback_prefix.trim_matches('/').is_empty() {
        errors.push(ValidationError::EmptyFallbackPrefix);
    }

    if config
        .observability
        .log_level
        .parse::<tracing::Level>()
        .is_err()
    {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
