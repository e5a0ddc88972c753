//! Least Connections selection strategy.

use std::sync::Arc;

use crate::load_balancer::{backend::Backend, Strategy};

/// Selects the instance with the fewest in-flight calls and streams.
///
/// Long-lived bridge sessions hold their slot for the whole session, so this
/// spreads streams rather than requests.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for LeastConnections {
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        // Ties go to the first instance (stability).
        backends.iter().min_by_key(|b| b.load()).cloned()
    }
}
