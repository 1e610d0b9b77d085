//! Command-line and environment overrides.
//!
//! Every flag falls back to an environment variable, so the proxy can be
//! configured entirely from the environment (e.g. a container `.env` file).

use clap::builder::BoolishValueParser;
use clap::Args;

use crate::config::schema::ProxyConfig;

/// Values that override the configuration file when present.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// Upstream base URL.
    #[arg(long, env = "REMOTE_URL")]
    pub remote_url: Option<String>,

    /// Allow HTTP/2 to the upstream.
    #[arg(long, env = "REMOTE_URL_HTTP2", value_parser = BoolishValueParser::new())]
    pub remote_http2: Option<bool>,

    /// Header carrying the upstream credential.
    #[arg(long, env = "REMOTE_AUTH_HEADER")]
    pub remote_auth_header: Option<String>,

    /// Upstream credential.
    #[arg(long, env = "REMOTE_AUTH_TOKEN", hide_env_values = true)]
    pub remote_auth_token: Option<String>,

    /// Upstream read timeout in seconds.
    #[arg(long, env = "REMOTE_TIMEOUT")]
    pub remote_timeout: Option<u64>,

    /// Local listen port (binds 0.0.0.0).
    #[arg(long, env = "LOCAL_PORT")]
    pub port: Option<u16>,

    /// Log level.
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Stream successful responses.
    #[arg(long, env = "STREAM_RESPONSE", value_parser = BoolishValueParser::new())]
    pub stream_response: Option<bool>,

    /// Decode compressed upstream responses.
    #[arg(long, env = "DECODE_RESPONSE", value_parser = BoolishValueParser::new())]
    pub decode_response: Option<bool>,

    /// Rewrite numeric model identifiers to model names.
    #[arg(long, env = "CORRECT_NUMBERED_MODEL_NAMES", value_parser = BoolishValueParser::new())]
    pub correct_numbered_model_names: Option<bool>,

    /// Enable the response cache.
    #[arg(long, env = "CACHE_ENABLED", value_parser = BoolishValueParser::new())]
    pub cache_enabled: Option<bool>,

    /// Maximum cached responses.
    #[arg(long, env = "CACHE_MAXSIZE")]
    pub cache_max_entries: Option<usize>,

    /// Cache entry lifetime in seconds.
    #[arg(long, env = "CACHE_TTL")]
    pub cache_ttl: Option<u64>,

    /// Cache key digest: "auto" or an algorithm name.
    #[arg(long, env = "HASH_ALGORITHM")]
    pub hash_algorithm: Option<String>,
}

impl ConfigOverrides {
    /// Write every present value into `config`.
    pub fn apply(self, config: &mut ProxyConfig) {
        if let Some(url) = self.remote_url {
            config.upstream.url = Some(url);
        }
        if let Some(http2) = self.remote_http2 {
            config.upstream.http2 = http2;
        }
        if let Some(header) = self.remote_auth_header {
            config.upstream.auth_header = header;
        }
        if let Some(token) = self.remote_auth_token {
            config.upstream.auth_token = Some(token);
        }
        if let Some(timeout) = self.remote_timeout {
            config.upstream.timeout_secs = Some(timeout);
        }
        if let Some(port) = self.port {
            config.listener.bind_address = format!("0.0.0.0:{}", port);
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if let Some(stream) = self.stream_response {
            config.forwarding.stream_response = stream;
        }
        if let Some(decode) = self.decode_response {
            config.forwarding.decode_response = decode;
        }
        if let Some(correct) = self.correct_numbered_model_names {
            config.forwarding.correct_numbered_model_names = correct;
        }
        if let Some(enabled) = self.cache_enabled {
            config.cache.enabled = enabled;
        }
        if let Some(max) = self.cache_max_entries {
            config.cache.max_entries = max;
        }
        if let Some(ttl) = self.cache_ttl {
            config.cache.ttl_secs = ttl;
        }
        if let Some(algorithm) = self.hash_algorithm {
            config.cache.hash_algorithm = algorithm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        overrides: ConfigOverrides,
    }

    #[test]
    fn test_flags_override_config() {
        let cli = TestCli::parse_from([
            "test",
            "--remote-url",
            "http://gpu-box:11434",
            "--port",
            "8080",
            "--stream-response",
            "no",
            "--cache-ttl",
            "120",
            "--hash-algorithm",
            "sha256",
        ]);
        let mut config = ProxyConfig::default();
        cli.overrides.apply(&mut config);

        assert_eq!(config.upstream.url.as_deref(), Some("http://gpu-box:11434"));
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert!(!config.forwarding.stream_response);
        assert_eq!(config.cache.ttl_secs, 120);
        assert_eq!(config.cache.hash_algorithm, "sha256");
        // Untouched values keep their defaults.
        assert!(config.cache.enabled);
        assert_eq!(config.upstream.auth_header, "Authorization");
    }
}
