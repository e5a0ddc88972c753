//! Per-call backend selection.
//!
//! # Responsibilities
//! - Pair a service's instance list with its selection strategy
//! - Hand out connection guards for tracking in-flight use

use std::sync::Arc;

use crate::load_balancer::{
    backend::{Backend, BackendConnectionGuard},
    Strategy,
};

/// Selection strategy usable per call.
///
/// Built once per unary call and once per bridged connection from the
/// resolved service's instances.
#[derive(Debug, Clone)]
pub struct Selector {
    backends: Arc<[Arc<Backend>]>,
    strategy: Arc<dyn Strategy>,
}

impl Selector {
    pub fn new(backends: Arc<[Arc<Backend>]>, strategy: Arc<dyn Strategy>) -> Self {
        Self { backends, strategy }
    }

    /// Select an instance and take a connection slot on it.
    pub fn next(&self) -> Option<BackendConnectionGuard> {
        match self.strategy.next_server(&self.backends) {
            Some(backend) => backend.try_create_guard(),
            None => {
                tracing::debug!(backend_count = self.backends.len(), "No backend instance available");
                None
            }
        }
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }
}
