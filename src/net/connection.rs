//! Bridge session lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique session IDs for tracing
//! - Count active bridge sessions
//! - Let shutdown wait for sessions to drain

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::observability::metrics;

/// Global atomic counter for session IDs.
/// Relaxed ordering is enough; only uniqueness matters.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a bridge session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Tracks active bridge sessions for graceful shutdown.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    active: Arc<watch::Sender<usize>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { active: Arc::new(tx) }
    }

    /// Record a new session. The returned guard ends it on drop.
    pub fn track(&self) -> SessionGuard {
        self.active.send_modify(|count| *count += 1);
        metrics::set_active_sessions(*self.active.borrow());
        SessionGuard {
            active: Arc::clone(&self.active),
            id: SessionId::new(),
        }
    }

    pub fn active_count(&self) -> usize {
        *self.active.borrow()
    }

    /// Wait until no sessions remain. Returns `false` on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.active.subscribe();
        let idle = tokio::time::timeout(timeout, rx.wait_for(|count| *count == 0))
            .await
            .is_ok();
        idle
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks one session as active for as long as it lives.
#[derive(Debug)]
pub struct SessionGuard {
    active: Arc<watch::Sender<usize>>,
    id: SessionId,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.send_modify(|count| *count = count.saturating_sub(1));
        metrics::set_active_sessions(*self.active.borrow());
        tracing::trace!(session_id = %self.id, "Session ended");
    }
}
