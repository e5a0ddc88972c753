//! Request inspection helpers.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for tracing
//! - Read the bridge-relevant headers (content type, call timeout)
//!
//! # Design Decisions
//! - Request ID added as early as possible, by middleware
//! - An unparseable `Timeout` header is ignored rather than rejected

use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderName, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::codec::{strip_params, Encoding};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Header carrying the caller's deadline as integer seconds.
pub const TIMEOUT_HEADER: HeaderName = HeaderName::from_static("timeout");

/// Generates `x-request-id` values.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        Uuid::new_v4().to_string().parse().ok().map(RequestId::new)
    }
}

/// Access to the request ID set by the middleware.
pub trait RequestIdExt {
    fn request_id(&self) -> &str;
}

impl RequestIdExt for HeaderMap {
    fn request_id(&self) -> &str {
        self.get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    }
}

/// Raw `Content-Type`, or empty when absent.
pub fn content_type(headers: &HeaderMap) -> &str {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Stripped content type and its classification.
pub fn classify(headers: &HeaderMap) -> (String, Encoding) {
    let stripped = strip_params(content_type(headers)).trim();
    (stripped.to_string(), Encoding::classify(stripped))
}

/// Caller-declared deadline from the `Timeout` header.
pub fn call_timeout(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(TIMEOUT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn parses_timeout_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(call_timeout(&headers), None);

        headers.insert(TIMEOUT_HEADER, HeaderValue::from_static("5"));
        assert_eq!(call_timeout(&headers), Some(Duration::from_secs(5)));

        headers.insert(TIMEOUT_HEADER, HeaderValue::from_static("soon"));
        assert_eq!(call_timeout(&headers), None);
    }

    #[test]
    fn classifies_content_type() {
        let mut headers = HeaderMap::new();
        assert_eq!(classify(&headers), (String::new(), Encoding::StructuredText));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/protobuf; charset=utf-8"),
        );
        assert_eq!(
            classify(&headers),
            ("application/protobuf".to_string(), Encoding::BinaryFramed)
        );
    }

    #[test]
    fn request_id_defaults_to_unknown() {
        let mut headers = HeaderMap::new();
        assert_eq!(headers.request_id(), "unknown");
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc"));
        assert_eq!(headers.request_id(), "abc");
    }

    #[test]
    fn generates_uuid_request_ids() {
        let request = Request::new(());
        let id = MakeRequestUuid.make_request_id(&request).unwrap();
        let value = id.header_value().to_str().unwrap();
        assert!(Uuid::parse_str(value).is_ok());
    }
}
