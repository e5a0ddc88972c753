//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request path ("/greeter/Say.Hello")
//!     → registry.rs (service lookup, endpoint attributes)
//!     → ResolvedService (service + endpoint)
//!     → Selector for the call (load_balancer)
//! ```
//!
//! # Design Decisions
//! - Registry compiled from config, immutable at runtime
//! - Deterministic: same path always resolves to the same service

pub mod registry;

pub use registry::{Endpoint, ResolvedService, Service, ServiceRegistry};
