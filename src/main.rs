//! Ollama deproxy
//!
//! A caching reverse proxy in front of an Ollama-compatible model server.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                      DEPROXY                         │
//!                     │                                                      │
//!   Client Request    │  ┌─────────┐    ┌──────────┐    ┌───────────────┐    │
//!   ──────────────────┼─▶│  http   │───▶│ routing  │───▶│ cache (tags,  │    │
//!                     │  │ server  │    │ prefixes │    │ models, show) │    │
//!                     │  └─────────┘    └──────────┘    └──────┬────────┘    │
//!                     │                                   miss │ / bypass    │
//!                     │                                        ▼             │
//!                     │                 ┌──────────┐    ┌───────────────┐    │
//!                     │                 │  models  │◀───│   upstream    │    │
//!                     │                 │ rewriter │    │   forwarder   │────┼──▶ Ollama
//!   Client Response   │  ┌─────────┐    └──────────┘    └──────┬────────┘    │
//!   ◀─────────────────┼──│ header  │◀────────────────────────────┘            │
//!                     │  │ filter  │   buffered or streamed                   │
//!                     │  └─────────┘                                          │
//!                     │                                                      │
//!                     │  config · observability · lifecycle                  │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use ollama_deproxy::config::{resolve_config, ConfigOverrides};
use ollama_deproxy::lifecycle::{startup, StartupError};
use ollama_deproxy::observability::logging;

#[derive(Parser)]
#[command(name = "ollama-deproxy")]
#[command(about = "Caching reverse proxy for Ollama-compatible model servers", long_about = None)]
struct Cli {
    /// Optional TOML configuration file; flags and environment take precedence.
    #[arg(short, long, env = "DEPROXY_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref(), cli.overrides)?;

    logging::init_logging(&config.observability.log_level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ollama-deproxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = config.upstream.url.as_deref().unwrap_or_default(),
        stream_response = config.forwarding.stream_response,
        cache_enabled = config.cache.enabled,
        "Configuration loaded"
    );

    startup::run(config).await
}
