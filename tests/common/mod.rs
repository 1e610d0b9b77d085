//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use futures_util::stream;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use ollama_deproxy::cache::ResponseCache;
use ollama_deproxy::config::ProxyConfig;
use ollama_deproxy::http::HttpServer;
use ollama_deproxy::lifecycle::Shutdown;

/// Model listing served on `/api/tags`, deliberately not in recency order.
pub const MODEL_LISTING: &str = r#"{"models":[
    {"name":"old:latest","modified_at":"2024-01-01T00:00:00Z"},
    {"name":"newest:latest","modified_at":"2024-06-01T00:00:00Z"},
    {"name":"mid:latest","modified_at":"2024-03-01T00:00:00Z"}
]}"#;

/// Chunks emitted by the streaming `/api/generate` endpoint.
pub const GENERATE_CHUNKS: [&str; 3] = [
    "{\"response\":\"Hel\"}\n",
    "{\"response\":\"lo\"}\n",
    "{\"done\":true}\n",
];

/// A request as seen by the mock upstream.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    tags_failures: Arc<AtomicUsize>,
}

/// Mock Ollama server on an ephemeral port.
pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    tags_failures: Arc<AtomicUsize>,
}

impl MockUpstream {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of requests received for `path` (leading slash included).
    pub fn calls(&self, path: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.path == path).count()
    }

    pub fn last(&self, path: &str) -> Option<RecordedRequest> {
        self.requests.lock().iter().rev().find(|r| r.path == path).cloned()
    }

    /// Answer the next `count` model listing requests with a 500.
    pub fn fail_tags(&self, count: usize) {
        self.tags_failures.store(count, Ordering::SeqCst);
    }
}

/// Start the mock upstream.
///
/// Routes:
/// - `/api/tags`: model listing, or 500 while `fail_tags` is pending
/// - `/api/show`: 404 when the body mentions "missing", else a model card
/// - `/api/chat`: echoes the request body
/// - `/api/generate`: streams `GENERATE_CHUNKS`
/// - `/api/endless`: a chunk every 20ms, never finishing
/// - `/api/unavailable`: 503 "model is loading"
/// - `/api/headers`: 200 with headers the proxy must (not) relay
/// - anything else: 200 with the path as body
pub async fn start_mock_upstream() -> MockUpstream {
    let state = MockState::default();
    let requests = state.requests.clone();
    let tags_failures = state.tags_failures.clone();

    let app = Router::new().fallback(mock_handler).with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockUpstream {
        addr,
        requests,
        tags_failures,
    }
}

async fn mock_handler(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    state.requests.lock().push(RecordedRequest {
        method,
        path: path.clone(),
        query: uri.query().map(str::to_string),
        headers,
        body: body.clone(),
    });

    match path.as_str() {
        "/api/tags" => {
            let failing = state
                .tags_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                json(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"listing unavailable"}"#)
            } else {
                json(StatusCode::OK, MODEL_LISTING)
            }
        }
        "/api/show" => {
            if String::from_utf8_lossy(&body).contains("missing") {
                json(StatusCode::NOT_FOUND, r#"{"error":"model not found"}"#)
            } else {
                json(StatusCode::OK, r#"{"modelfile":"FROM llama3","parameters":""}"#)
            }
        }
        "/api/chat" => (StatusCode::OK, body).into_response(),
        "/api/generate" => {
            let chunks = GENERATE_CHUNKS
                .iter()
                .map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c.as_bytes())));
            let mut response = Response::new(Body::from_stream(stream::iter(chunks)));
            response.headers_mut().insert(
                "content-type",
                HeaderValue::from_static("application/x-ndjson"),
            );
            response
        }
        "/api/endless" => {
            let chunks = stream::unfold(0u64, |n| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let chunk = Bytes::from(format!("{{\"response\":\"{n}\"}}\n"));
                Some((Ok::<_, std::io::Error>(chunk), n + 1))
            });
            Response::new(Body::from_stream(chunks))
        }
        "/api/unavailable" => (StatusCode::SERVICE_UNAVAILABLE, "model is loading").into_response(),
        "/api/headers" => {
            let mut response = (StatusCode::OK, "headers").into_response();
            let headers = response.headers_mut();
            headers.insert("server", HeaderValue::from_static("mock-ollama"));
            headers.insert("alt-svc", HeaderValue::from_static("h3=\":443\""));
            headers.insert("x-upstream-marker", HeaderValue::from_static("1"));
            headers.append("set-cookie", HeaderValue::from_static("a=1"));
            headers.append("set-cookie", HeaderValue::from_static("b=2"));
            response
        }
        other => (StatusCode::OK, other.to_string()).into_response(),
    }
}

fn json(status: StatusCode, body: &'static str) -> Response {
    let mut response = (status, body).into_response();
    response
        .headers_mut()
        .insert("content-type", HeaderValue::from_static("application/json"));
    response
}

/// Configuration pointing at `upstream_url`, with a pinned digest so tests skip the benchmark.
pub fn test_config(upstream_url: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.upstream.url = Some(upstream_url.to_string());
    config.upstream.auth_token = Some("Bearer upstream-secret".to_string());
    config.upstream.timeout_secs = Some(5);
    config.cache.hash_algorithm = "sha256".to_string();
    config.forwarding.correct_numbered_model_names = false;
    config
}

/// A running proxy instance.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub cache: Option<Arc<ResponseCache>>,
    pub shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a proxy with `config` on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let server = HttpServer::new(config).unwrap();
    let cache = server.cache().cloned();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });

    TestProxy {
        addr,
        cache,
        shutdown,
    }
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Client that neither pools nor follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
