//! Pooled upstream HTTP session.
//!
//! # Responsibilities
//! - Build `reqwest` clients from `UpstreamConfig` (auth, timeouts, HTTP/2)
//! - Join upstream paths onto the configured base URL
//! - Bound concurrent upstream exchanges with a semaphore
//!
//! # Design Decisions
//! - Two clients share one configuration: one decodes compressed bodies,
//!   one relays them raw; callers pick per request
//! - Redirects are never followed; the client sees upstream redirects as-is
//! - A permit is held until the response body is fully consumed or dropped

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

use crate::config::UpstreamConfig;
use crate::http::response::filter_headers;
use crate::upstream::forward::{BufferedResponse, PreparedRequest};
use crate::upstream::stream::UpstreamStream;
use crate::upstream::UpstreamError;

/// Shared handle to the upstream server. Cheap to clone.
#[derive(Debug, Clone)]
pub struct UpstreamSession {
    base_url: String,
    decoding: reqwest::Client,
    raw: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl UpstreamSession {
    /// Build a session from validated configuration.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let raw_url = config.url.as_deref().unwrap_or_default().trim();
        let parsed = Url::parse(raw_url).map_err(|source| UpstreamError::InvalidUrl {
            url: raw_url.to_string(),
            source,
        })?;

        let mut default_headers = HeaderMap::new();
        if let Some(token) = &config.auth_token {
            let name = HeaderName::from_bytes(config.auth_header.as_bytes())
                .map_err(|_| UpstreamError::InvalidAuthHeader(config.auth_header.clone()))?;
            let mut value = HeaderValue::from_str(token)
                .map_err(|_| UpstreamError::InvalidAuthHeader(config.auth_header.clone()))?;
            value.set_sensitive(true);
            default_headers.insert(name, value);
        }

        let decoding = Self::client_builder(config, default_headers.clone())
            .build()
            .map_err(UpstreamError::Client)?;
        let raw = Self::client_builder(config, default_headers)
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .build()
            .map_err(UpstreamError::Client)?;

        tracing::info!(
            upstream = %parsed,
            http2 = config.http2,
            authenticated = config.auth_token.is_some(),
            timeout_secs = ?config.timeout_secs,
            max_connections = config.max_connections,
            "Upstream session configured"
        );

        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            decoding,
            raw,
            permits: Arc::new(Semaphore::new(config.max_connections.max(1))),
        })
    }

    fn client_builder(config: &UpstreamConfig, default_headers: HeaderMap) -> reqwest::ClientBuilder {
        let mut builder = reqwest::Client::builder()
            .default_headers(default_headers)
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(config.max_keepalive_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        if let Some(secs) = config.timeout_secs {
            builder = builder.read_timeout(Duration::from_secs(secs));
        }
        if !config.http2 {
            builder = builder.http1_only();
        }
        builder
    }

    /// Join `path` (and an optional raw query string) onto the base URL.
    pub fn target_url(&self, path: &str, query: Option<&str>) -> Result<Url, UpstreamError> {
        let joined = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut url = Url::parse(&joined).map_err(|source| UpstreamError::InvalidUrl {
            url: joined.clone(),
            source,
        })?;
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.set_query(Some(query));
        }
        Ok(url)
    }

    /// Client that decodes (`true`) or relays raw (`false`) response bodies.
    pub fn client(&self, decode: bool) -> &reqwest::Client {
        if decode {
            &self.decoding
        } else {
            &self.raw
        }
    }

    /// Send a prepared request and return once the response head arrives.
    pub async fn send(
        &self,
        request: &PreparedRequest,
        decode: bool,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| UpstreamError::Closed)?;

        tracing::debug!(
            method = %request.method,
            target_url = %request.url,
            body_len = request.body.len(),
            "Sending upstream request"
        );

        let mut builder = self
            .client(decode)
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(UpstreamError::Transport)?;
        Ok(UpstreamResponse { response, permit })
    }

    /// Buffered, decoded GET of an upstream path (no client headers).
    pub async fn get(&self, path: &str) -> Result<BufferedResponse, UpstreamError> {
        let request = PreparedRequest {
            method: Method::GET,
            url: self.target_url(path, None)?,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };
        let response = self.send(&request, true).await?;
        let status = response.status();
        let headers = filter_headers(response.headers(), true);
        let body = response.bytes().await?;
        Ok(BufferedResponse {
            status,
            headers,
            body,
        })
    }

    /// Stop issuing new upstream requests. In-flight exchanges finish normally.
    pub fn close(&self) {
        self.permits.close();
    }

    /// Number of upstream exchanges that may still start right now.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Upstream response head plus the connection permit it occupies.
#[derive(Debug)]
pub struct UpstreamResponse {
    response: reqwest::Response,
    permit: OwnedSemaphorePermit,
}

impl UpstreamResponse {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    /// Read the whole body, releasing the permit afterwards.
    pub async fn bytes(self) -> Result<Bytes, UpstreamError> {
        let body = self.response.bytes().await.map_err(UpstreamError::Body)?;
        drop(self.permit);
        Ok(body)
    }

    /// Turn the body into a single-pass chunk stream that owns the permit.
    pub fn into_stream(self, target: String) -> UpstreamStream {
        UpstreamStream::new(self.response.bytes_stream(), target, self.permit)
    }
}
