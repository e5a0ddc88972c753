//! Round-robin selection strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{backend::Backend, Strategy};

/// Rotates through instances, skipping ones at their connection limit.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for RoundRobin {
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }

        let start = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = backends.len();
        (0..len)
            .map(|i| &backends[(start + i) % len])
            .find(|b| b.load() < b.max_connections)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(addr: &str, max: usize) -> Arc<Backend> {
        Arc::new(Backend::new(addr, max).unwrap())
    }

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let b1 = backend("127.0.0.1:8080", 100);
        let b2 = backend("127.0.0.1:8081", 100);
        let backends = vec![b1.clone(), b2.clone()];

        assert_eq!(lb.next_server(&backends).unwrap().addr, b1.addr);
        assert_eq!(lb.next_server(&backends).unwrap().addr, b2.addr);
        assert_eq!(lb.next_server(&backends).unwrap().addr, b1.addr);
    }

    #[test]
    fn skips_saturated_instances() {
        let lb = RoundRobin::new();
        let b1 = backend("127.0.0.1:8080", 1);
        let b2 = backend("127.0.0.1:8081", 1);
        let _held = b1.try_create_guard().unwrap();
        let backends = vec![b1, b2.clone()];

        assert_eq!(lb.next_server(&backends).unwrap().addr, b2.addr);
        assert_eq!(lb.next_server(&backends).unwrap().addr, b2.addr);
    }
}
