//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Upstream model server connection.
    pub upstream: UpstreamConfig,

    /// Forwarding behavior (streaming, decoding, model-name rewrite).
    pub forwarding: ForwardingConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:11434").
    pub bind_address: String,

    /// Maximum accepted request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:11434".to_string(),
            max_body_size: 32 * 1024 * 1024,
        }
    }
}

/// Upstream connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the model server (required).
    pub url: Option<String>,

    /// Allow HTTP/2 when the server negotiates it.
    pub http2: bool,

    /// Header carrying the upstream credential.
    pub auth_header: String,

    /// Credential sent in `auth_header`, verbatim.
    pub auth_token: Option<String>,

    /// Read timeout in seconds; none waits indefinitely.
    pub timeout_secs: Option<u64>,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Maximum concurrent upstream exchanges.
    pub max_connections: usize,

    /// Maximum idle keep-alive connections kept in the pool.
    pub max_keepalive_connections: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: None,
            http2: true,
            auth_header: "Authorization".to_string(),
            auth_token: None,
            timeout_secs: None,
            connect_timeout_secs: 10,
            max_connections: 100,
            max_keepalive_connections: 50,
        }
    }
}

/// Forwarding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Stream successful responses instead of buffering them.
    pub stream_response: bool,

    /// Decode compressed upstream bodies before relaying.
    pub decode_response: bool,

    /// Replace numeric `model` values with the matching model name.
    pub correct_numbered_model_names: bool,

    /// Leading path segments forwarded as-is.
    pub compatible_prefixes: Vec<String>,

    /// Prefix prepended to paths with an unknown leading segment.
    pub fallback_prefix: String,

    /// Re-fetch the model listing after this many seconds; none keeps it forever.
    pub models_refresh_secs: Option<u64>,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            stream_response: true,
            decode_response: false,
            correct_numbered_model_names: true,
            compatible_prefixes: vec!["api".to_string(), "v1".to_string()],
            fallback_prefix: "v1".to_string(),
            models_refresh_secs: None,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable response caching for model endpoints.
    pub enabled: bool,

    /// Maximum number of cached responses.
    pub max_entries: usize,

    /// Entry lifetime in seconds.
    pub ttl_secs: u64,

    /// Body digest for cache keys: "auto" or an algorithm name.
    pub hash_algorithm: String,

    /// Interval between expired-entry sweeps in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 256,
            ttl_secs: 60,
            hash_algorithm: "auto".to_string(),
            sweep_interval_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [upstream]
            url = "https://ollama.example.com"
            auth_token = "secret"

            [cache]
            ttl_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.url.as_deref(), Some("https://ollama.example.com"));
        assert_eq!(config.upstream.auth_header, "Authorization");
        assert_eq!(config.upstream.max_connections, 100);
        assert_eq!(config.cache.ttl_secs, 5);
        assert_eq!(config.cache.max_entries, 256);
        assert_eq!(config.listener.bind_address, "0.0.0.0:11434");
        assert_eq!(config.forwarding.compatible_prefixes, vec!["api", "v1"]);
        assert!(config.forwarding.stream_response);
        assert!(!config.forwarding.decode_response);
    }
}
