//! Request bridging.
//!
//! # Data Flow
//! ```text
//! Resolved request
//!     ├── upgrade + stream-capable endpoint → stream.rs
//!     │       handshake → open backend stream → session.rs (two relays)
//!     └── otherwise → unary.rs
//!             extract payload → one backend call → one response
//! ```
//!
//! # Design Decisions
//! - Both paths share one `Bridge` (transport, extractor, scopes)
//! - Streaming errors after the upgrade are logged, never written as HTTP

pub mod session;
pub mod stream;
pub mod unary;

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;

use crate::http::websocket;
use crate::lifecycle::Context;
use crate::net::SessionTracker;
use crate::payload::PayloadExtractor;
use crate::routing::ResolvedService;
use crate::transport::Transport;

pub use session::{BridgeSession, RelayExit, SessionOutcome, StreamGuard};

/// Shared collaborators for both bridge paths.
#[derive(Clone)]
pub struct Bridge {
    pub transport: Arc<dyn Transport>,
    pub extractor: PayloadExtractor,
    pub sessions: SessionTracker,
    /// Parent of every session scope; cancelled on shutdown.
    pub root: Context,
    pub upgrade_timeout: Duration,
    pub error_id: Arc<str>,
}

/// Whether a request should be served by the streaming bridge.
pub fn is_stream(headers: &HeaderMap, target: &ResolvedService) -> bool {
    websocket::is_websocket(headers) && target.is_streaming()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointConfig, ServiceConfig};
    use crate::routing::ServiceRegistry;
    use axum::http::{header, HeaderValue};
    use std::collections::HashMap;

    #[test]
    fn stream_gate_needs_upgrade_and_attribute() {
        let registry = ServiceRegistry::from_config(&[ServiceConfig {
            name: "greeter".into(),
            instances: vec!["127.0.0.1:9000".into()],
            strategy: Default::default(),
            max_connections: 8,
            endpoints: vec![EndpointConfig {
                name: "Say.Stream".into(),
                metadata: HashMap::from([("stream".to_string(), "true".to_string())]),
            }],
        }]);

        let mut upgrade = HeaderMap::new();
        upgrade.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        upgrade.insert(header::UPGRADE, HeaderValue::from_static("websocket"));

        let streaming = registry.resolve("/greeter/Say.Stream").unwrap();
        let unary = registry.resolve("/greeter/Say.Hello").unwrap();

        assert!(is_stream(&upgrade, &streaming));
        assert!(!is_stream(&upgrade, &unary));
        assert!(!is_stream(&HeaderMap::new(), &streaming));
    }
}
