//! Request forwarding engine.
//!
//! # Responsibilities
//! - Prepare the upstream request (target URL, header sanitizing, model rewrite)
//! - Execute it buffered or streaming
//! - Relay upstream errors verbatim, synthesize 500 on transport failure
//!
//! # Design Decisions
//! - One preamble (`prepare`) feeds both execution strategies
//! - Error responses are never streamed; they are drained, logged and buffered
//! - Transport failures never reach the client as anything but an opaque 500

use std::borrow::Cow;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use url::Url;

use crate::http::response::filter_headers;
use crate::models::ModelNameRewriter;
use crate::observability::metrics;
use crate::upstream::session::UpstreamSession;
use crate::upstream::UpstreamError;

/// Body shown to clients when the upstream could not be reached.
pub const UPSTREAM_FAILURE_BODY: &str = "Upstream request failed";

/// Request bodies longer than this are truncated in error logs.
const LOG_BODY_LIMIT: usize = 2048;

/// How successful responses are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    /// Read the whole upstream body, then respond.
    Buffered,
    /// Relay upstream chunks as they arrive.
    Streaming,
}

/// Client request as received by the proxy, body already read.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Normalized path, without leading slash.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Upstream-ready request shared by both execution strategies.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Fully read response, ready to relay or cache.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub status: StatusCode,
    /// Already filtered for downstream use.
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BufferedResponse {
    /// Generic 500 used for proxy-side failures.
    pub fn upstream_failure() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers,
            body: Bytes::from_static(UPSTREAM_FAILURE_BODY.as_bytes()),
        }
    }
}

impl IntoResponse for BufferedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Copy client headers for the upstream, minus `host` and `authorization`.
///
/// The session supplies its own credential. `x-request-id` is kept for
/// correlation with upstream logs.
pub fn build_proxy_headers(headers: &HeaderMap) -> HeaderMap {
    let mut proxy_headers = headers.clone();
    proxy_headers.remove(HOST);
    proxy_headers.remove(AUTHORIZATION);
    proxy_headers
}

/// Forwards client requests to the upstream server.
#[derive(Debug, Clone)]
pub struct Forwarder {
    session: UpstreamSession,
    rewriter: Option<ModelNameRewriter>,
    mode: ForwardMode,
    decode: bool,
}

impl Forwarder {
    pub fn new(
        session: UpstreamSession,
        rewriter: Option<ModelNameRewriter>,
        mode: ForwardMode,
        decode: bool,
    ) -> Self {
        Self {
            session,
            rewriter,
            mode,
            decode,
        }
    }

    pub fn session(&self) -> &UpstreamSession {
        &self.session
    }

    /// Build the upstream request: target URL, sanitized headers, rewritten body.
    pub async fn prepare(&self, request: InboundRequest) -> Result<PreparedRequest, UpstreamError> {
        let url = self
            .session
            .target_url(&request.path, request.query.as_deref())?;
        let mut headers = build_proxy_headers(&request.headers);
        let mut body = request.body;

        if let Some(rewriter) = &self.rewriter {
            if let Some(rewritten) = rewriter.rewrite(&body).await {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(rewritten.len()));
                body = rewritten;
            }
        }

        Ok(PreparedRequest {
            method: request.method,
            url,
            headers,
            body,
        })
    }

    /// Forward using the configured mode.
    pub async fn dispatch(&self, request: InboundRequest) -> Response {
        match self.mode {
            ForwardMode::Buffered => self.forward(request, self.decode).await.into_response(),
            ForwardMode::Streaming => self.forward_streaming(request).await,
        }
    }

    /// Buffered forward. `decode` selects decoded or raw body bytes.
    pub async fn forward(&self, request: InboundRequest, decode: bool) -> BufferedResponse {
        let path = request.path.clone();
        let prepared = match self.prepare(request).await {
            Ok(prepared) => prepared,
            Err(e) => return transport_failure(&path, &e),
        };

        match self.execute_buffered(&prepared, decode).await {
            Ok(response) => response,
            Err(e) => transport_failure(prepared.url.as_str(), &e),
        }
    }

    async fn execute_buffered(
        &self,
        prepared: &PreparedRequest,
        decode: bool,
    ) -> Result<BufferedResponse, UpstreamError> {
        let upstream = self.session.send(prepared, decode).await?;
        let status = upstream.status();
        let headers = filter_headers(upstream.headers(), decode);
        let body = upstream.bytes().await?;

        if is_error_status(status) {
            log_upstream_error(prepared, status, &body);
        }

        Ok(BufferedResponse {
            status,
            headers,
            body,
        })
    }

    /// Streaming forward. Only successful responses are streamed.
    pub async fn forward_streaming(&self, request: InboundRequest) -> Response {
        let path = request.path.clone();
        let prepared = match self.prepare(request).await {
            Ok(prepared) => prepared,
            Err(e) => return transport_failure(&path, &e).into_response(),
        };

        let upstream = match self.session.send(&prepared, self.decode).await {
            Ok(upstream) => upstream,
            Err(e) => return transport_failure(prepared.url.as_str(), &e).into_response(),
        };

        let status = upstream.status();
        let headers = filter_headers(upstream.headers(), self.decode);

        if is_error_status(status) {
            // Drain the error body so it can be logged and relayed whole.
            let body = match upstream.bytes().await {
                Ok(body) => body,
                Err(e) => return transport_failure(prepared.url.as_str(), &e).into_response(),
            };
            log_upstream_error(&prepared, status, &body);
            return BufferedResponse {
                status,
                headers,
                body,
            }
            .into_response();
        }

        let stream = upstream.into_stream(prepared.url.to_string());
        let mut response = Response::new(Body::from_stream(stream));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

fn is_error_status(status: StatusCode) -> bool {
    status.as_u16() >= 400
}

fn transport_failure(target: &str, error: &UpstreamError) -> BufferedResponse {
    tracing::error!(target_url = %target, error = %error, "Upstream request failed");
    metrics::record_upstream_failure(error.kind());
    BufferedResponse::upstream_failure()
}

fn log_upstream_error(prepared: &PreparedRequest, status: StatusCode, response_body: &[u8]) {
    tracing::error!(
        target_url = %prepared.url,
        status = status.as_u16(),
        request_body = %body_preview(&prepared.body),
        response_body = %body_preview(response_body),
        "Upstream returned error"
    );
}

fn body_preview(body: &[u8]) -> Cow<'_, str> {
    let end = body.len().min(LOG_BODY_LIMIT);
    let text = String::from_utf8_lossy(&body[..end]);
    if body.len() > LOG_BODY_LIMIT {
        Cow::Owned(format!("{}... ({} bytes)", text, body.len()))
    } else {
        text
    }
}
