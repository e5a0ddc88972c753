//! Service registry and path resolution.
//!
//! # Responsibilities
//! - Hold the known services, their instances and endpoint attributes
//! - Resolve a request path to a service + endpoint
//! - Build a per-call `Selector` for a resolved service
//!
//! # Design Decisions
//! - Immutable after construction; hot reload swaps the whole registry
//! - Unknown endpoints of a known service still route (no attributes)
//! - Explicit `RoutingFailed` rather than a silent default

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::error::BridgeError;
use crate::load_balancer::{backend::Backend, Selector, Strategy};

/// Endpoint metadata key marking stream-capable endpoints.
pub const STREAM_ATTRIBUTE: &str = "stream";

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub name: String,
    pub metadata: HashMap<String, String>,
}

impl Endpoint {
    pub fn is_streaming(&self) -> bool {
        self.metadata.get(STREAM_ATTRIBUTE).map(String::as_str) == Some("true")
    }
}

/// A backend service with its instances.
#[derive(Debug)]
pub struct Service {
    pub name: String,
    instances: Arc<[Arc<Backend>]>,
    strategy: Arc<dyn Strategy>,
    endpoints: Vec<Endpoint>,
}

impl Service {
    pub fn from_config(config: &ServiceConfig) -> Self {
        let instances: Vec<Arc<Backend>> = config
            .instances
            .iter()
            .filter_map(|addr| match Backend::new(addr.as_str(), config.max_connections) {
                Ok(backend) => Some(Arc::new(backend)),
                Err(e) => {
                    tracing::warn!(service = %config.name, address = %addr, error = %e, "Invalid instance address");
                    None
                }
            })
            .collect();

        Self {
            name: config.name.clone(),
            instances: instances.into(),
            strategy: config.strategy.build(),
            endpoints: config
                .endpoints
                .iter()
                .map(|e| Endpoint {
                    name: e.name.clone(),
                    metadata: e.metadata.clone(),
                })
                .collect(),
        }
    }

    /// Selection strategy over this service's instances.
    pub fn selector(&self) -> Selector {
        Selector::new(self.instances.clone(), self.strategy.clone())
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn instances(&self) -> &[Arc<Backend>] {
        &self.instances
    }
}

/// A service paired with the endpoint a request targets.
#[derive(Debug, Clone)]
pub struct ResolvedService {
    pub service: Arc<Service>,
    pub endpoint: String,
}

impl ResolvedService {
    /// Whether the targeted endpoint is marked stream-capable.
    pub fn is_streaming(&self) -> bool {
        self.service
            .endpoints
            .iter()
            .filter(|ep| ep.name == self.endpoint)
            .any(Endpoint::is_streaming)
    }

    pub fn name(&self) -> &str {
        &self.service.name
    }
}

/// Immutable set of known services.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<Service>>,
}

impl ServiceRegistry {
    pub fn from_config(configs: &[ServiceConfig]) -> Self {
        let services = configs
            .iter()
            .map(|c| (c.name.clone(), Arc::new(Service::from_config(c))))
            .collect();
        Self { services }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Service>> {
        self.services.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Resolve `/{service}/{endpoint...}`.
    pub fn resolve(&self, path: &str) -> Result<ResolvedService, BridgeError> {
        let trimmed = path.trim_start_matches('/');
        let (service_name, endpoint) = match trimmed.split_once('/') {
            Some((s, e)) if !s.is_empty() && !e.is_empty() => (s, e),
            _ => return Err(BridgeError::RoutingFailed(format!("no endpoint in path {:?}", path))),
        };

        let service = self
            .get(service_name)
            .ok_or_else(|| BridgeError::RoutingFailed(format!("unknown service {:?}", service_name)))?;

        Ok(ResolvedService {
            service,
            endpoint: endpoint.to_string(),
        })
    }

    /// Resolve against a fixed service, taking the endpoint from `endpoint`
    /// or, when absent, from the request path.
    pub fn resolve_pinned(
        &self,
        service_name: &str,
        endpoint: Option<&str>,
        path: &str,
    ) -> Result<ResolvedService, BridgeError> {
        let service = self
            .get(service_name)
            .ok_or_else(|| BridgeError::RoutingFailed(format!("unknown service {:?}", service_name)))?;
        let endpoint = endpoint
            .map(str::to_string)
            .unwrap_or_else(|| path.trim_start_matches('/').to_string());

        Ok(ResolvedService { service, endpoint })
    }
}
