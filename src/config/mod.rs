//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BridgeConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads + validates
//!     → server swaps the service registry atomically
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Only the service registry is hot-reloaded; listener, limits and
//!   timeouts apply at start-up

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BridgeConfig, BridgeSettings, BufferPoolConfig, EndpointConfig, LimitsConfig, ListenerConfig,
    ObservabilityConfig, ServiceConfig, TimeoutConfig, TlsConfig,
};
