//! Unary call bridge: one payload in, one response out.

use axum::body::Body;
use axum::http::{Request, Response};

use crate::bridge::Bridge;
use crate::error::BridgeError;
use crate::http::request::{call_timeout, classify, content_type, RequestIdExt};
use crate::http::response::{write_error, write_response};
use crate::routing::ResolvedService;
use crate::transport::{CallOptions, CallRequest};

pub async fn serve(bridge: &Bridge, target: ResolvedService, request: Request<Body>) -> Response<Body> {
    let (parts, body) = request.into_parts();
    let raw_content_type = content_type(&parts.headers).to_string();
    let (stripped, encoding) = classify(&parts.headers);

    let result: Result<_, BridgeError> = async {
        let payload = bridge
            .extractor
            .extract(&parts.method, &parts.uri, encoding, body)
            .await?;

        let call = CallRequest::new(
            target.name(),
            target.endpoint.as_str(),
            payload.bytes,
            encoding.backend_content_type(&stripped),
        );
        let options = CallOptions::new(target.service.selector()).with_timeout(call_timeout(&parts.headers));

        Ok(bridge.transport.call(call, options).await?)
    }
    .await;

    match result {
        Ok(body) => write_response(&raw_content_type, body),
        Err(e) => {
            tracing::warn!(
                request_id = %parts.headers.request_id(),
                service = %target.name(),
                endpoint = %target.endpoint,
                status = e.status().as_u16(),
                error = %e,
                "Call failed"
            );
            write_error(&raw_content_type, &bridge.error_id, &e)
        }
    }
}
