//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order (metrics, upstream, hash selector)
//! - Bind the listener and begin accepting traffic
//! - Wire termination signals to the shutdown broadcast
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The hash benchmark runs before the listener binds, off the async workers
//! - Listener starts last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::cache::{HashPolicy, HashSelector};
use crate::config::{ConfigError, ProxyConfig};
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;
use crate::upstream::UpstreamError;

/// Fatal errors while bringing the proxy up or serving.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Run the hash benchmark (if not pinned) and log the outcome.
pub async fn warm_hash_selector(selector: Arc<HashSelector>) {
    let pinned = matches!(selector.policy(), HashPolicy::Pinned(_));
    let algorithm = match tokio::task::spawn_blocking(move || selector.select()).await {
        Ok(algorithm) => algorithm,
        Err(e) => {
            tracing::warn!(error = %e, "Hash benchmark task failed; it will run on first use");
            return;
        }
    };

    if pinned {
        tracing::info!(algorithm = %algorithm, "Using configured hash algorithm");
    } else {
        tracing::info!(
            algorithm = %algorithm,
            "Selected fastest hash algorithm; set HASH_ALGORITHM={} to skip the benchmark",
            algorithm
        );
    }
}

/// Bind the configured address.
pub async fn bind(config: &ProxyConfig) -> Result<TcpListener, StartupError> {
    let address = config.listener.bind_address.clone();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.clone(),
            source,
        })?;
    if let Ok(local) = listener.local_addr() {
        tracing::info!(address = %local, "Listening for connections");
    }
    Ok(listener)
}

/// Bring the proxy up and serve until a termination signal arrives.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let cache_enabled = config.cache.enabled;
    let server = HttpServer::new(config)?;
    if cache_enabled {
        warm_hash_selector(server.selector().clone()).await;
    }

    let listener = bind(server.config()).await?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    signals::spawn_signal_handler(shutdown);

    server.run(listener, receiver).await.map_err(StartupError::Serve)?;

    tracing::info!("Shutdown complete");
    Ok(())
}
