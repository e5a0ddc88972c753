//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Response;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use rpc_bridge::config::{BridgeConfig, EndpointConfig, ServiceConfig};
use rpc_bridge::http::HttpServer;
use rpc_bridge::lifecycle::Shutdown;
use rpc_bridge::net::SessionTracker;
use rpc_bridge::transport::MemoryTransport;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const MAX_RECV_SIZE: usize = 64;

/// A running bridge backed by an in-memory transport.
pub struct TestBridge {
    pub addr: SocketAddr,
    pub transport: MemoryTransport,
    pub sessions: SessionTracker,
    pub shutdown: Shutdown,
}

impl TestBridge {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

fn endpoint(name: &str, streaming: bool) -> EndpointConfig {
    let mut metadata = HashMap::new();
    metadata.insert("stream".to_string(), streaming.to_string());
    EndpointConfig {
        name: name.to_string(),
        metadata,
    }
}

/// `greeter` has one instance and a streaming `Say.Stream` endpoint;
/// `offline` declares the same endpoints but has no instances.
pub fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.limits.max_recv_size = MAX_RECV_SIZE;
    config.services = vec![
        ServiceConfig {
            name: "greeter".to_string(),
            instances: vec!["127.0.0.1:9000".to_string()],
            strategy: Default::default(),
            max_connections: 64,
            endpoints: vec![endpoint("Say.Hello", false), endpoint("Say.Stream", true)],
        },
        ServiceConfig {
            name: "offline".to_string(),
            instances: vec![],
            strategy: Default::default(),
            max_connections: 64,
            endpoints: vec![endpoint("Say.Hello", false), endpoint("Say.Stream", true)],
        },
    ];
    config
}

/// Start a bridge on an ephemeral port.
pub async fn start_bridge(config: BridgeConfig) -> TestBridge {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let transport = MemoryTransport::new();
    let server = HttpServer::new(config, Arc::new(transport.clone()));
    let sessions = server.sessions();
    let shutdown = Shutdown::new();
    tokio::spawn(server.run(listener, None, shutdown.subscribe()));

    TestBridge {
        addr,
        transport,
        sessions,
        shutdown,
    }
}

/// Open a WebSocket to the bridge with extra request headers.
pub async fn connect_ws(
    addr: SocketAddr,
    path: &str,
    headers: &[(&'static str, &str)],
) -> Result<(WsClient, Response), tungstenite::Error> {
    let mut request = format!("ws://{}{}", addr, path).into_client_request()?;
    for (name, value) in headers {
        request
            .headers_mut()
            .insert(*name, HeaderValue::from_str(value).unwrap());
    }
    connect_async(request).await
}

/// Fail the test instead of hanging.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}

/// Next data or close message, skipping ping/pong.
pub async fn next_message(ws: &mut WsClient) -> Option<Message> {
    within(async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(message)) => return Some(message),
                Some(Err(_)) | None => return None,
            }
        }
    })
    .await
}
