//! Backend selection subsystem.
//!
//! # Data Flow
//! ```text
//! Service resolved → instances + strategy
//!     → selector.rs (one Selector per call / bridged connection)
//!     → Apply strategy:
//!         - random.rs (uniform pick, the default)
//!         - round_robin.rs (rotate through instances)
//!         - least_conn.rs (fewest in-flight calls/streams)
//!     → backend.rs (connection guard held for the call/stream)
//! ```

pub mod backend;
pub mod least_conn;
pub mod random;
pub mod round_robin;
pub mod selector;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use backend::Backend;

pub use selector::Selector;

/// A backend selection algorithm.
pub trait Strategy: Send + Sync + std::fmt::Debug {
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;
}

/// Strategy name as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Random,
    RoundRobin,
    LeastConn,
}

impl StrategyKind {
    pub fn build(self) -> Arc<dyn Strategy> {
        match self {
            StrategyKind::Random => Arc::new(random::Random),
            StrategyKind::RoundRobin => Arc::new(round_robin::RoundRobin::new()),
            StrategyKind::LeastConn => Arc::new(least_conn::LeastConnections::new()),
        }
    }
}
