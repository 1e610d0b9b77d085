//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, catch-all handler)
//!     → request.rs (request ID for log correlation)
//!     → [routing normalizes the path]
//!     → [cache or upstream forwarder produces the response]
//!     → response.rs (hop-by-hop and encoding header filter)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{request_id, X_REQUEST_ID};
pub use response::filter_headers;
pub use server::{AppState, HttpServer};
