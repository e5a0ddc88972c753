//! WebSocket upgrade handling.
//!
//! # Responsibilities
//! - Detect upgrade requests
//! - Validate the client handshake and build the `101 Switching Protocols` response
//! - Turn the upgraded hyper connection into a `WebSocketStream`
//!
//! # Design Decisions
//! - Handshake done by hand over `hyper::upgrade` so the bridge controls
//!   sub-protocol selection and the upgrade timeout
//! - Any requested sub-protocol is accepted; `binary` is preferred
//! - Extensions are never negotiated

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Response, StatusCode};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;

use crate::error::BridgeError;

/// Upgraded connection type handed to bridge sessions.
pub type UpgradedSocket = WebSocketStream<TokioIo<hyper::upgrade::Upgraded>>;

/// Sub-protocol that forces binary framing.
pub const BINARY_PROTOCOL: &str = "binary";

/// Whether the request asks for a WebSocket upgrade.
pub fn is_websocket(headers: &HeaderMap) -> bool {
    header_has_token(headers, header::CONNECTION, "upgrade")
        && header_has_token(headers, header::UPGRADE, "websocket")
}

fn header_has_token(headers: &HeaderMap, name: header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|v| v.trim().eq_ignore_ascii_case(token))
}

/// Sub-protocols offered by the client, in order.
pub fn requested_protocols(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// The sub-protocol echoed back to the client.
pub fn select_protocol(protocols: &[String]) -> Option<&str> {
    protocols
        .iter()
        .find(|p| p.as_str() == BINARY_PROTOCOL)
        .or_else(|| protocols.first())
        .map(String::as_str)
}

/// Validate the client handshake and build the switching response.
pub fn accept_response(
    method: &Method,
    headers: &HeaderMap,
    protocol: Option<&str>,
) -> Result<Response<Body>, BridgeError> {
    if method != Method::GET {
        return Err(BridgeError::UpgradeFailed(format!("upgrade requires GET, got {}", method)));
    }

    let version = headers
        .get(header::SEC_WEBSOCKET_VERSION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim);
    if version != Some("13") {
        return Err(BridgeError::UpgradeFailed("unsupported websocket version".into()));
    }

    let key = headers
        .get(header::SEC_WEBSOCKET_KEY)
        .ok_or_else(|| BridgeError::UpgradeFailed("missing websocket key".into()))?;

    let mut builder = Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::CONNECTION, "upgrade")
        .header(header::UPGRADE, "websocket")
        .header(header::SEC_WEBSOCKET_ACCEPT, derive_accept_key(key.as_bytes()));

    if let Some(protocol) = protocol {
        let value = HeaderValue::from_str(protocol)
            .map_err(|_| BridgeError::UpgradeFailed("invalid sub-protocol".into()))?;
        builder = builder.header(header::SEC_WEBSOCKET_PROTOCOL, value);
    }

    builder
        .body(Body::empty())
        .map_err(|e| BridgeError::UpgradeFailed(e.to_string()))
}

/// Wait for hyper to hand over the connection, bounded by `timeout`.
pub async fn complete_upgrade(on_upgrade: OnUpgrade, timeout: Duration) -> Result<UpgradedSocket, BridgeError> {
    let upgraded = tokio::time::timeout(timeout, on_upgrade)
        .await
        .map_err(|_| BridgeError::UpgradeFailed(format!("upgrade timed out after {:?}", timeout)))?
        .map_err(|e| BridgeError::UpgradeFailed(e.to_string()))?;

    Ok(WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await)
}
