//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared proxy state (session, rewriter, forwarder, cache)
//! - Create the Axum router with a catch-all handler
//! - Wire up middleware (tracing, request ID, body limit)
//! - Serve until shutdown, then release the cache and upstream session

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::cache::{HashPolicy, HashSelector, ResponseCache};
use crate::config::ProxyConfig;
use crate::http::request::request_id;
use crate::models::{ModelNameRewriter, ModelRegistry, OllamaModelRegistry};
use crate::observability::metrics;
use crate::routing::PrefixNormalizer;
use crate::upstream::{ForwardMode, Forwarder, InboundRequest, UpstreamError, UpstreamSession};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub forwarder: Arc<Forwarder>,
    pub cache: Option<Arc<ResponseCache>>,
    pub normalizer: Arc<PrefixNormalizer>,
    pub max_body_size: usize,
}

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    router: Router,
    state: AppState,
    selector: Arc<HashSelector>,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server from validated configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, UpstreamError> {
        let session = UpstreamSession::from_config(&config.upstream)?;
        let registry = config.forwarding.correct_numbered_model_names.then(|| {
            let refresh = config.forwarding.models_refresh_secs.map(Duration::from_secs);
            Arc::new(OllamaModelRegistry::new(session.clone(), refresh)) as Arc<dyn ModelRegistry>
        });
        Ok(Self::with_registry(config, session, registry))
    }

    /// Create a server around an existing session and optional model registry.
    pub fn with_registry(
        config: ProxyConfig,
        session: UpstreamSession,
        registry: Option<Arc<dyn ModelRegistry>>,
    ) -> Self {
        let policy = config
            .cache
            .hash_algorithm
            .parse::<HashPolicy>()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to automatic hash selection");
                HashPolicy::Auto
            });
        let selector = Arc::new(HashSelector::new(policy));

        let mode = if config.forwarding.stream_response {
            ForwardMode::Streaming
        } else {
            ForwardMode::Buffered
        };
        let forwarder = Arc::new(Forwarder::new(
            session,
            registry.map(ModelNameRewriter::new),
            mode,
            config.forwarding.decode_response,
        ));

        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(ResponseCache::from_config(&config.cache, selector.clone())));

        let normalizer = Arc::new(PrefixNormalizer::new(
            config.forwarding.compatible_prefixes.clone(),
            config.forwarding.fallback_prefix.clone(),
        ));

        let state = AppState {
            forwarder,
            cache,
            normalizer,
            max_body_size: config.listener.max_body_size,
        };

        tracing::info!(
            mode = ?mode,
            decode_response = config.forwarding.decode_response,
            rewrite_model_names = config.forwarding.correct_numbered_model_names,
            cache_enabled = config.cache.enabled,
            "Proxy configured"
        );

        let router = Self::build_router(&config, state.clone());
        Self {
            router,
            state,
            selector,
            config,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(RequestBodyLimitLayer::new(config.listener.max_body_size)),
            )
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if let Some(cache) = &self.state.cache {
            let interval = Duration::from_secs(self.config.cache.sweep_interval_secs.max(1));
            tokio::spawn(cache.clone().run_sweeper(interval, shutdown.resubscribe()));
        }

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        if let Some(cache) = &self.state.cache {
            cache.clear();
        }
        self.state.forwarder.session().close();

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Hash selector shared by the cache key builder.
    pub fn selector(&self) -> &Arc<HashSelector> {
        &self.selector
    }

    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.state.cache.as_ref()
    }
}

/// Main proxy handler.
/// Normalizes the path, serves cacheable requests from the cache, forwards the rest.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(request.headers()).to_string();

    let (parts, body) = request.into_parts();
    let raw_path = parts.uri.path().trim_start_matches('/');
    let path = state.normalizer.normalize(raw_path).into_owned();

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        path = %path,
        "Proxying request"
    );

    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to read request body");
            metrics::record_request(parts.method.as_str(), 400, start_time);
            return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
        }
    };

    let method = parts.method.clone();
    let request = InboundRequest {
        method: parts.method,
        path,
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
    };

    let forwarder = &state.forwarder;
    let cached = match &state.cache {
        Some(cache) => {
            cache
                .get_or_fetch(&request.path, &request.method, &request.body, || {
                    forwarder.forward(request.clone(), true)
                })
                .await
        }
        None => None,
    };

    let response = match cached {
        Some(response) => response,
        None => forwarder.dispatch(request).await,
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start_time);
    response
}
