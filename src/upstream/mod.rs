//! Upstream forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! InboundRequest
//!     → forward.rs prepare (target URL, header sanitizing, model rewrite)
//!     → session.rs send (connection permit, reqwest client)
//!     → Buffered:  read body → filter headers → BufferedResponse
//!     → Streaming: status >= 400 → drain + buffer
//!                  success      → stream.rs UpstreamStream → client
//! ```
//!
//! # Design Decisions
//! - Upstream errors are relayed, never retried
//! - Transport failures become a generic 500
//! - Streaming resources are released by a drop guard

pub mod forward;
pub mod session;
pub mod stream;

pub use forward::{BufferedResponse, ForwardMode, Forwarder, InboundRequest, PreparedRequest};
pub use session::{UpstreamResponse, UpstreamSession};
pub use stream::UpstreamStream;

/// Errors talking to the upstream server.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid upstream URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid upstream auth header '{0}'")]
    InvalidAuthHeader(String),

    #[error("upstream session closed")]
    Closed,

    #[error("upstream request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("failed to read upstream body: {0}")]
    Body(#[source] reqwest::Error),
}

impl UpstreamError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Client(_) => "client",
            UpstreamError::InvalidUrl { .. } => "invalid_url",
            UpstreamError::InvalidAuthHeader(_) => "auth_header",
            UpstreamError::Closed => "closed",
            UpstreamError::Transport(e) | UpstreamError::Body(e) if e.is_timeout() => "timeout",
            UpstreamError::Transport(e) if e.is_connect() => "connect",
            UpstreamError::Transport(_) => "transport",
            UpstreamError::Body(_) => "body",
        }
    }
}
