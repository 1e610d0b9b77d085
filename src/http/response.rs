//! Response header policy.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers before relaying an upstream response
//! - Strip headers the proxy invalidates (length, server identity, date)
//! - Strip `content-encoding` once the body has been decoded
//!
//! # Design Decisions
//! - Header names are matched case-insensitively (`HeaderName` is lowercase)
//! - Multi-valued headers (e.g. `set-cookie`) are preserved in order
//! - The server layer re-frames the body, so framing headers never pass through

use axum::http::{HeaderMap, HeaderName};

/// Headers that are never relayed to the client.
pub const EXCLUDED_HEADERS: [&str; 12] = [
    "content-length",
    "connection",
    "server",
    "date",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "upgrade",
    "alt-svc",
    "transfer-encoding",
];

/// Returns true if `name` must not be relayed downstream.
pub fn is_excluded(name: &HeaderName, decoded: bool) -> bool {
    let name = name.as_str();
    EXCLUDED_HEADERS.iter().any(|excluded| name.eq_ignore_ascii_case(excluded))
        || (decoded && name.eq_ignore_ascii_case("content-encoding"))
}

/// Return the subset of `headers` that is safe to re-emit downstream.
///
/// `decoded` tells whether the payload was decoded from its original
/// content encoding; in that case the encoding declaration is dropped too.
pub fn filter_headers(headers: &HeaderMap, decoded: bool) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if !is_excluded(name, decoded) {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}
