//! HTTP/WebSocket to backend RPC bridge.

pub mod bridge;
pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod payload;
pub mod routing;
pub mod transport;

pub use config::schema::BridgeConfig;
pub use error::BridgeError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
