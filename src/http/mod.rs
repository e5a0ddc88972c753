//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, dispatch)
//!     → request.rs (request ID, content type, call timeout)
//!     → [routing resolves service + endpoint]
//!     → websocket.rs (upgrade handshake, stream path only)
//!     → [bridge: unary call or streaming session]
//!     → response.rs (response / structured error, grpc status)
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::{MakeRequestUuid, RequestIdExt, X_REQUEST_ID};
pub use server::HttpServer;
