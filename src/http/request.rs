//! Request identification.
//!
//! # Responsibilities
//! - Name the request ID header set by the middleware stack
//! - Read it back for log correlation
//!
//! # Design Decisions
//! - IDs are generated by `tower-http` (UUID v4) as early as possible
//! - The ID is echoed on the response and reaches the upstream with the other
//!   client headers, so both sides log the same value

use axum::http::HeaderMap;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Request ID of an inbound request, `"unknown"` when absent or not UTF-8.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_request_id_lookup() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers), "unknown");

        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc-123"));
        assert_eq!(request_id(&headers), "abc-123");
    }
}
