//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router with the bridge handler
//! - Wire up middleware (request ID, tracing, timeout)
//! - Resolve each request to a service endpoint and dispatch it
//!   to the unary or streaming bridge
//! - Swap the service registry when the config file changes
//! - Graceful shutdown: stop accepting, end sessions, drain
//!
//! # Design Decisions
//! - One catch-all handler; the service registry does the routing
//! - Registry held in `ArcSwap` so reloads never block requests
//! - Plain TCP via `axum::serve`, TLS via `axum-server`

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, Response},
    routing::any,
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::bridge::{self, stream, unary, Bridge};
use crate::config::{BridgeConfig, BridgeSettings};
use crate::error::BridgeError;
use crate::http::request::{content_type, MakeRequestUuid, RequestIdExt, X_REQUEST_ID};
use crate::http::response::write_error;
use crate::lifecycle::Context;
use crate::net::{tls, SessionTracker};
use crate::observability::metrics;
use crate::payload::PayloadExtractor;
use crate::routing::{ResolvedService, ServiceRegistry};
use crate::transport::Transport;

/// Fixed target when the bridge serves a single service.
#[derive(Debug, Clone)]
pub struct PinnedTarget {
    pub service: String,
    pub endpoint: Option<String>,
}

impl PinnedTarget {
    fn from_settings(settings: &BridgeSettings) -> Option<Self> {
        settings.pinned_service.as_ref().map(|service| Self {
            service: service.clone(),
            endpoint: settings.pinned_endpoint.clone(),
        })
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ArcSwap<ServiceRegistry>>,
    pub bridge: Bridge,
    pub pinned: Option<PinnedTarget>,
}

/// HTTP server for the bridge.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: BridgeConfig,
}

impl HttpServer {
    pub fn new(config: BridgeConfig, transport: Arc<dyn Transport>) -> Self {
        let registry = Arc::new(ArcSwap::from_pointee(ServiceRegistry::from_config(&config.services)));

        let bridge = Bridge {
            transport,
            extractor: PayloadExtractor::new(config.limits.max_recv_size),
            sessions: SessionTracker::new(),
            root: Context::new(),
            upgrade_timeout: Duration::from_secs(config.timeouts.upgrade_secs),
            error_id: Arc::from(config.bridge.error_id.as_str()),
        };

        let state = AppState {
            registry,
            bridge,
            pinned: PinnedTarget::from_settings(&config.bridge),
        };

        let router = Self::build_router(&config, state.clone());
        Self { router, state, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &BridgeConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(bridge_handler))
            .route("/", any(bridge_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
    }

    /// Root cancellation scope of every bridge session.
    pub fn root_context(&self) -> Context {
        self.state.bridge.root.clone()
    }

    pub fn sessions(&self) -> SessionTracker {
        self.state.bridge.sessions.clone()
    }

    /// Run the server until `shutdown` fires.
    ///
    /// New configurations arriving on `config_updates` replace the service
    /// registry; listener and limits keep their start-up values.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: Option<mpsc::UnboundedReceiver<BridgeConfig>>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, services = self.state.registry.load().len(), "HTTP server starting");

        if let Some(updates) = config_updates {
            tokio::spawn(apply_config_updates(self.state.registry.clone(), updates));
        }

        let root = self.state.bridge.root.clone();
        let sessions = self.state.bridge.sessions.clone();
        let drain = Duration::from_secs(self.config.timeouts.drain_secs);
        let signal = async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received");
            root.cancel();
        };

        match &self.config.listener.tls {
            Some(tls_config) => {
                let rustls = tls::load_tls_config(tls_config).await?;
                let handle = axum_server::Handle::new();
                let shutdown_handle = handle.clone();
                tokio::spawn(async move {
                    signal.await;
                    shutdown_handle.graceful_shutdown(Some(drain));
                });

                tracing::info!(address = %addr, "TLS enabled");
                axum_server::from_tcp_rustls(listener.into_std()?, rustls)
                    .handle(handle)
                    .serve(self.router.into_make_service())
                    .await?;
            }
            None => {
                axum::serve(listener, self.router)
                    .with_graceful_shutdown(signal)
                    .await?;
            }
        }

        if !sessions.wait_idle(drain).await {
            tracing::warn!(remaining = sessions.active_count(), "Sessions still active after drain timeout");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

async fn apply_config_updates(
    registry: Arc<ArcSwap<ServiceRegistry>>,
    mut updates: mpsc::UnboundedReceiver<BridgeConfig>,
) {
    while let Some(config) = updates.recv().await {
        let next = ServiceRegistry::from_config(&config.services);
        tracing::info!(services = next.len(), "Service registry reloaded");
        registry.store(Arc::new(next));
    }
}

/// Resolve the target and decide between streaming and unary handling.
fn route(state: &AppState, request: &Request<Body>) -> Result<(ResolvedService, bool), BridgeError> {
    let registry = state.registry.load();
    let path = request.uri().path();

    let target = match &state.pinned {
        Some(pinned) => registry.resolve_pinned(&pinned.service, pinned.endpoint.as_deref(), path)?,
        None => {
            let target = registry.resolve(path)?;
            // Only GET and POST when routing by path.
            if request.method() != Method::GET && request.method() != Method::POST {
                return Err(BridgeError::MethodNotAllowed);
            }
            target
        }
    };

    let streaming = bridge::is_stream(request.headers(), &target);
    Ok((target, streaming))
}

/// Main bridge handler.
async fn bridge_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let start = Instant::now();
    let method = request.method().clone();

    tracing::debug!(
        request_id = %request.headers().request_id(),
        method = %method,
        path = %request.uri().path(),
        "Bridging request"
    );

    let (response, mode) = match route(&state, &request) {
        Ok((target, true)) => (stream::serve(&state.bridge, target, request).await, "stream"),
        Ok((target, false)) => (unary::serve(&state.bridge, target, request).await, "unary"),
        Err(e) => {
            tracing::warn!(
                request_id = %request.headers().request_id(),
                path = %request.uri().path(),
                error = %e,
                "Request rejected"
            );
            (write_error(content_type(request.headers()), &state.bridge.error_id, &e), "rejected")
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), mode, start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointConfig, ServiceConfig};
    use crate::transport::MemoryTransport;
    use axum::http::StatusCode;
    use bytes::Bytes;
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.services = vec![ServiceConfig {
            name: "greeter".into(),
            instances: vec!["127.0.0.1:9000".into()],
            strategy: Default::default(),
            max_connections: 8,
            endpoints: vec![EndpointConfig {
                name: "Say.Hello".into(),
                metadata: HashMap::new(),
            }],
        }];
        config
    }

    fn server(config: BridgeConfig) -> (HttpServer, MemoryTransport) {
        let transport = MemoryTransport::new();
        transport.handle("greeter", "Say.Hello", |req| async move {
            Ok(Bytes::from(format!("{}:{}", req.endpoint, req.payload.len())))
        });
        (HttpServer::new(config, Arc::new(transport.clone())), transport)
    }

    fn request(method: Method, path: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap()
    }

    #[tokio::test]
    async fn routes_by_path_and_sets_request_id() {
        let (server, _) = server(config());

        let response = server.router.oneshot(request(Method::POST, "/greeter/Say.Hello")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Say.Hello:2");
    }

    #[tokio::test]
    async fn path_routing_rejects_other_methods() {
        let (server, _) = server(config());

        let response = server.router.oneshot(request(Method::DELETE, "/greeter/Say.Hello")).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn pinned_service_accepts_any_method() {
        let mut config = config();
        config.bridge.pinned_service = Some("greeter".into());
        config.bridge.pinned_endpoint = Some("Say.Hello".into());
        let (server, _) = server(config);

        let response = server.router.oneshot(request(Method::PATCH, "/anything/else")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Say.Hello:2");
    }

    #[tokio::test]
    async fn config_updates_replace_registry() {
        let (server, _) = server(config());
        let registry = server.state.registry.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(apply_config_updates(registry.clone(), rx));

        tx.send(BridgeConfig::default()).unwrap();
        drop(tx);
        task.await.unwrap();

        assert!(registry.load().is_empty());
    }
}
