//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (pinned service exists)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function: &BridgeConfig → Result<(), ValidationErrors>

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use url::Url;

use crate::config::schema::BridgeConfig;

/// A single semantic problem in a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every problem found in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

pub fn validate_config(config: &BridgeConfig) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("invalid socket address {:?}", config.listener.bind_address),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address {:?}", config.observability.metrics_address),
        ));
    }

    for (field, value) in [
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("timeouts.upgrade_secs", config.timeouts.upgrade_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if config.limits.max_recv_size == 0 {
        errors.push(ValidationError::new("limits.max_recv_size", "must be greater than 0"));
    }
    if config.buffer_pool.capacity == 0 {
        errors.push(ValidationError::new("buffer_pool.capacity", "must be greater than 0"));
    }

    let mut names = HashSet::new();
    for (i, service) in config.services.iter().enumerate() {
        if service.name.is_empty() || service.name.contains('/') {
            errors.push(ValidationError::new(
                format!("services[{}].name", i),
                "must be a non-empty path segment",
            ));
        }
        if !names.insert(service.name.as_str()) {
            errors.push(ValidationError::new(
                format!("services[{}].name", i),
                format!("duplicate service {:?}", service.name),
            ));
        }
        if service.max_connections == 0 {
            errors.push(ValidationError::new(
                format!("services[{}].max_connections", i),
                "must be greater than 0",
            ));
        }
        for (j, instance) in service.instances.iter().enumerate() {
            if Url::parse(&format!("http://{}", instance)).is_err() {
                errors.push(ValidationError::new(
                    format!("services[{}].instances[{}]", i, j),
                    format!("invalid address {:?}", instance),
                ));
            }
        }
    }

    if let Some(pinned) = &config.bridge.pinned_service {
        if !names.contains(pinned.as_str()) {
            errors.push(ValidationError::new(
                "bridge.pinned_service",
                format!("unknown service {:?}", pinned),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}
