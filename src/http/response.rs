//! Response writing.
//!
//! # Responsibilities
//! - Write a unary backend response (content type mirrored, length set)
//! - Write structured JSON error bodies with mapped status codes
//! - Add gRPC-style status headers for `application/grpc*` requests
//!
//! # Design Decisions
//! - The error body shape is fixed: `{"id","code","detail","status"}`
//! - Success reports grpc-status 0, failure grpc-status 13

use axum::body::Body;
use axum::http::{header, HeaderValue, Response};
use axum::response::IntoResponse;
use bytes::Bytes;
use serde::Serialize;

use crate::error::BridgeError;

const GRPC_STATUS: &str = "grpc-status";
const GRPC_MESSAGE: &str = "grpc-message";
const GRPC_OK: &str = "0";
const GRPC_INTERNAL: &str = "13";

/// Identifier used in error bodies when none is configured.
pub const DEFAULT_ERROR_ID: &str = "rpc.bridge";

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    id: &'a str,
    code: u16,
    detail: String,
    status: &'a str,
}

fn wants_grpc_status(content_type: &str) -> bool {
    content_type.contains("application/grpc")
}

fn set_grpc_status(response: &mut Response<Body>, status: &'static str, message: &str) {
    let headers = response.headers_mut();
    headers.insert(header::TRAILER, HeaderValue::from_static("grpc-status, grpc-message"));
    headers.insert(GRPC_STATUS, HeaderValue::from_static(status));
    // Header values cannot carry control characters; drop the message rather than the response.
    if let Ok(value) = HeaderValue::from_str(message) {
        headers.insert(GRPC_MESSAGE, value);
    }
}

/// Successful unary response. `content_type` is the raw request header.
pub fn write_response(content_type: &str, body: Bytes) -> Response<Body> {
    let length = body.len();
    let mut response = Response::new(Body::from(body));

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    if wants_grpc_status(content_type) {
        set_grpc_status(&mut response, GRPC_OK, "");
    }
    response
}

/// Structured error response.
pub fn write_error(content_type: &str, error_id: &str, err: &BridgeError) -> Response<Body> {
    let status = err.status();
    let body = ErrorBody {
        id: err.id(error_id),
        code: status.as_u16(),
        detail: err.detail(),
        status: status.canonical_reason().unwrap_or_default(),
    };
    let json = serde_json::to_vec(&body).unwrap_or_default();

    let mut response = Response::new(Body::from(json));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if wants_grpc_status(content_type) {
        set_grpc_status(&mut response, GRPC_INTERNAL, &body.detail);
    }
    response
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> axum::response::Response {
        write_error("", DEFAULT_ERROR_ID, &self)
    }
}
