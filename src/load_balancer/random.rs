//! Uniform random selection strategy.

use rand::seq::SliceRandom;
use std::sync::Arc;

use crate::load_balancer::{backend::Backend, Strategy};

/// Picks uniformly among instances below their connection limit.
#[derive(Debug, Default)]
pub struct Random;

impl Strategy for Random {
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        let open: Vec<&Arc<Backend>> = backends
            .iter()
            .filter(|b| b.load() < b.max_connections)
            .collect();
        open.choose(&mut rand::thread_rng()).map(|b| Arc::clone(b))
    }
}
