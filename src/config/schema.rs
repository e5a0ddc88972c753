//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::load_balancer::StrategyKind;

/// Root configuration for the bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Known backend services.
    pub services: Vec<ServiceConfig>,

    /// Request handling settings.
    pub bridge: BridgeSettings,

    /// Size limits.
    pub limits: LimitsConfig,

    /// Shared payload buffer pool.
    pub buffer_pool: BufferPoolConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// A backend service and its instances.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Logical service name; the first path segment of requests.
    pub name: String,

    /// Instance addresses (e.g., "127.0.0.1:9000").
    #[serde(default)]
    pub instances: Vec<String>,

    /// Instance selection strategy.
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Maximum concurrent calls/streams per instance.
    #[serde(default = "default_max_instance_conns")]
    pub max_connections: usize,

    /// Endpoint declarations with their metadata.
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

fn default_max_instance_conns() -> usize {
    1024
}

/// An endpoint of a service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Endpoint name (e.g., "Say.Hello").
    pub name: String,

    /// Free-form attributes; `stream = "true"` marks streaming endpoints.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Request handling settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Identifier reported in structured error bodies.
    pub error_id: String,

    /// Serve every request against this service instead of routing by path.
    /// Any HTTP method is accepted in this mode.
    pub pinned_service: Option<String>,

    /// Endpoint used with `pinned_service`; defaults to the request path.
    pub pinned_endpoint: Option<String>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            error_id: "rpc.bridge".to_string(),
            pinned_service: None,
            pinned_endpoint: None,
        }
    }
}

/// Size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_recv_size: usize,

    /// Maximum backend response size in bytes (unary).
    pub max_response_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_recv_size: 10 * 1024 * 1024, // 10MB
            max_response_size: 10 * 1024 * 1024,
        }
    }
}

/// Buffer pool sizing, fixed at process start.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    /// Number of buffers kept in the pool.
    pub capacity: usize,

    /// Initial allocation of each buffer in bytes.
    pub buffer_size: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            buffer_size: 4096,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Unary request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Connection upgrade handshake timeout in seconds.
    pub upgrade_secs: u64,

    /// How long shutdown waits for bridge sessions to drain, in seconds.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            upgrade_secs: 5,
            drain_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: BridgeConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.timeouts.upgrade_secs, 5);
        assert_eq!(config.bridge.error_id, "rpc.bridge");
        assert!(config.services.is_empty());
    }

    #[test]
    fn parses_services() {
        let config: BridgeConfig = toml::from_str(
            r#"
            [[services]]
            name = "greeter"
            instances = ["127.0.0.1:9000", "127.0.0.1:9001"]
            strategy = "round_robin"

            [[services.endpoints]]
            name = "Say.Stream"
            metadata = { stream = "true" }

            [[services.endpoints]]
            name = "Say.Hello"
            "#,
        )
        .unwrap();

        let service = &config.services[0];
        assert_eq!(service.name, "greeter");
        assert_eq!(service.instances.len(), 2);
        assert_eq!(service.strategy, StrategyKind::RoundRobin);
        assert_eq!(service.max_connections, 1024);
        assert_eq!(service.endpoints[0].metadata.get("stream").map(String::as_str), Some("true"));
        assert!(service.endpoints[1].metadata.is_empty());
    }
}
