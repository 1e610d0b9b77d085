//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → strip leading slash
//!     → prefix.rs (first segment compatible? keep : prepend fallback)
//!     → normalized path handed to cache and forwarder
//! ```
//!
//! # Design Decisions
//! - Every method on every path is proxied; there is no route table
//! - Normalization is built once at startup, immutable at runtime

pub mod prefix;

pub use prefix::PrefixNormalizer;
