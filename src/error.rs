//! Request-level error taxonomy.
//!
//! Every failure that can end an HTTP request maps to exactly one
//! `BridgeError` variant and from there to a status code. Failures after a
//! connection upgrade never become a `BridgeError` response; they are logged
//! by the session and end the affected relay direction.

use axum::http::StatusCode;
use thiserror::Error;

use crate::codec::envelope::EnvelopeError;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("routing failed: {0}")]
    RoutingFailed(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[from] EnvelopeError),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("upgrade failed: {0}")]
    UpgradeFailed(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error(transparent)]
    Transport(TransportError),
}

impl BridgeError {
    /// HTTP status reported for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RoutingFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::MalformedEnvelope(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BodyRead(_) => StatusCode::BAD_REQUEST,
            Self::UpgradeFailed(_) => StatusCode::BAD_REQUEST,
            Self::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Transport(TransportError::Status { code, .. }) => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Transport(TransportError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            Self::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable detail for the error body.
    pub fn detail(&self) -> String {
        match self {
            Self::Transport(TransportError::Status { detail, .. }) => detail.clone(),
            Self::Transport(err) => format!("error during request: {}", err),
            other => other.to_string(),
        }
    }

    /// Identifier for the error body; backend status errors carry their own.
    pub fn id<'a>(&'a self, default: &'a str) -> &'a str {
        match self {
            Self::Transport(TransportError::Status { id, .. }) if !id.is_empty() => id,
            _ => default,
        }
    }
}

impl From<TransportError> for BridgeError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unavailable(reason) => Self::BackendUnavailable(reason),
            other => Self::Transport(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            BridgeError::RoutingFailed("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(BridgeError::MethodNotAllowed.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            BridgeError::PayloadTooLarge { limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            BridgeError::from(EnvelopeError::JsonRpcParams).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BridgeError::from(TransportError::Unavailable("none".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            BridgeError::from(TransportError::Timeout).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn backend_status_passes_through() {
        let err = BridgeError::from(TransportError::Status {
            code: 404,
            id: "greeter".into(),
            detail: "not found".into(),
        });
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.detail(), "not found");
        assert_eq!(err.id("rpc.bridge"), "greeter");

        let err = BridgeError::from(TransportError::Status {
            code: 0,
            id: String::new(),
            detail: "boom".into(),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.id("rpc.bridge"), "rpc.bridge");
    }

    #[test]
    fn other_transport_errors_are_prefixed() {
        let err = BridgeError::from(TransportError::Io("connection reset".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.detail(), "error during request: connection reset");
    }
}
