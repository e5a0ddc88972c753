//! Structured logging.
//!
//! # Design Decisions
//! - Uses the tracing crate for structured logging
//! - `RUST_LOG` wins over the configured level when set

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(log_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn default_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(format!("rpc_bridge={level},tower_http={level}", level = log_level))
        .unwrap_or_else(|_| EnvFilter::new("rpc_bridge=info,tower_http=info"))
}
