//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tls.rs (optional TLS, via axum-server)
//!     → HTTP layer
//!     → connection.rs (bridge session tracking once upgraded)
//!
//! Session States:
//!     Upgrading → Relaying → Draining → Closed
//! ```
//!
//! # Design Decisions
//! - Every bridge session is tracked so shutdown can drain them
//! - TLS is optional and handled transparently

pub mod connection;
pub mod tls;

pub use connection::{SessionGuard, SessionId, SessionTracker};
