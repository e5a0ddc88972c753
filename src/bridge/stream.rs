//! Streaming bridge entry point.
//!
//! # States
//! ```text
//! Negotiating → Upgrading → Opening Backend Stream → Relaying → Closed
//! ```
//!
//! Everything up to the `101` response can still fail as an HTTP error.
//! After that, failures are logged and the connection is closed.

use axum::body::Body;
use axum::http::{Request, Response};

use crate::bridge::{Bridge, BridgeSession};
use crate::codec::FramingOp;
use crate::error::BridgeError;
use crate::http::request::{call_timeout, classify, content_type, RequestIdExt};
use crate::http::response::write_error;
use crate::http::websocket::{self, UpgradedSocket};
use crate::net::SessionId;
use crate::routing::ResolvedService;
use crate::transport::{CallOptions, CallRequest};

pub async fn serve(bridge: &Bridge, target: ResolvedService, mut request: Request<Body>) -> Response<Body> {
    let on_upgrade = hyper::upgrade::on(&mut request);
    let (parts, body) = request.into_parts();
    let raw_content_type = content_type(&parts.headers).to_string();
    let request_id = parts.headers.request_id().to_string();

    // Negotiating
    let (stripped, encoding) = classify(&parts.headers);
    let protocols = websocket::requested_protocols(&parts.headers);
    let op = FramingOp::negotiate(&stripped, protocols.iter().map(String::as_str));

    let accepted = websocket::accept_response(&parts.method, &parts.headers, websocket::select_protocol(&protocols));
    let response = match accepted {
        Ok(response) => response,
        Err(e) => return reject(bridge, &raw_content_type, &request_id, e),
    };

    let payload = match bridge
        .extractor
        .extract(&parts.method, &parts.uri, encoding, body)
        .await
    {
        Ok(payload) => payload,
        Err(e) => return reject(bridge, &raw_content_type, &request_id, e),
    };

    let call = CallRequest::new(
        target.name(),
        target.endpoint.as_str(),
        payload.bytes.clone(),
        encoding.backend_content_type(&stripped),
    )
    .streaming();
    let options = CallOptions::new(target.service.selector()).with_timeout(call_timeout(&parts.headers));

    let guard = bridge.sessions.track();
    let bridge = bridge.clone();
    tokio::spawn(async move {
        let id = guard.id();

        // Upgrading
        let socket = match websocket::complete_upgrade(on_upgrade, bridge.upgrade_timeout).await {
            Ok(socket) => socket,
            Err(e) => {
                tracing::warn!(session_id = %id, request_id = %request_id, error = %e, "Upgrade failed");
                return;
            }
        };

        // Opening Backend Stream
        let session_ctx = bridge.root.child();
        let mut stream = match bridge.transport.stream(&session_ctx, call, options).await {
            Ok(stream) => stream,
            Err(e) => {
                let err = BridgeError::BackendUnavailable(e.to_string());
                tracing::warn!(
                    session_id = %id,
                    request_id = %request_id,
                    service = %target.name(),
                    endpoint = %target.endpoint,
                    error = %err,
                    "Failed to open backend stream"
                );
                session_ctx.cancel();
                close_unrelayed(id, socket).await;
                return;
            }
        };

        if !payload.is_empty() {
            if let Err(e) = stream.send(payload.bytes).await {
                tracing::warn!(session_id = %id, error = %e, "Failed to send initial payload");
                if let Err(e) = stream.close().await {
                    tracing::debug!(session_id = %id, error = %e, "Backend stream close failed");
                }
                session_ctx.cancel();
                close_unrelayed(id, socket).await;
                return;
            }
        }

        tracing::info!(
            session_id = %id,
            request_id = %request_id,
            service = %target.name(),
            endpoint = %target.endpoint,
            "Bridge session started"
        );

        // Relaying → Closed
        let outcome = BridgeSession::new(id, socket, stream, op, encoding, session_ctx)
            .run()
            .await;

        tracing::info!(
            session_id = %id,
            upstream = ?outcome.upstream,
            downstream = ?outcome.downstream,
            "Bridge session finished"
        );
        drop(guard);
    });

    response
}

fn reject(bridge: &Bridge, content_type: &str, request_id: &str, err: BridgeError) -> Response<Body> {
    tracing::warn!(request_id = %request_id, error = %err, "Stream request rejected");
    write_error(content_type, &bridge.error_id, &err)
}

async fn close_unrelayed(id: SessionId, mut socket: UpgradedSocket) {
    if let Err(e) = socket.close(None).await {
        tracing::debug!(session_id = %id, error = %e, "Connection close failed");
    }
}
