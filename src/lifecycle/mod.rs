//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Init logging/metrics → Build server → Listen
//!
//! Shutdown (shutdown.rs):
//!     Signal received → root Context cancelled → sessions drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!
//! Cancellation (context.rs):
//!     server scope → session scope → backend stream scope
//! ```

pub mod context;
pub mod shutdown;
pub mod signals;

pub use context::Context;
pub use shutdown::Shutdown;
