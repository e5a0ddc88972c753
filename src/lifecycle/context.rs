//! Cancellation scopes.
//!
//! # Responsibilities
//! - Represent a cancellable scope (server, session, backend stream)
//! - Propagate cancellation from a parent scope to all of its children
//! - Allow both a non-blocking check and an awaitable signal
//!
//! # Design Decisions
//! - Built on `tokio::sync::watch`, one sender per scope
//! - Cancelling a child never affects its parent
//! - Scopes are cheap to clone; clones observe the same state

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;

/// A cancellable scope.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    tx: watch::Sender<bool>,
    parent: Option<Context>,
}

impl Context {
    /// Create a new root scope.
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    /// Create a child scope that is cancelled whenever `self` is.
    pub fn child(&self) -> Self {
        Self::with_parent(Some(self.clone()))
    }

    fn with_parent(parent: Option<Context>) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner { tx, parent }),
        }
    }

    /// Cancel this scope and every child derived from it.
    pub fn cancel(&self) {
        self.inner.tx.send_replace(true);
    }

    /// Non-blocking check.
    pub fn is_cancelled(&self) -> bool {
        *self.inner.tx.borrow()
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(|parent| parent.is_cancelled())
    }

    /// Resolves once this scope or any ancestor is cancelled.
    pub fn cancelled(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let mut rx = self.inner.tx.subscribe();
            match &self.inner.parent {
                Some(parent) => {
                    tokio::select! {
                        _ = rx.wait_for(|cancelled| *cancelled) => {}
                        _ = parent.cancelled() => {}
                    }
                }
                None => {
                    // The sender lives in `self`, so this only returns once cancelled.
                    let _ = rx.wait_for(|cancelled| *cancelled).await;
                }
            }
        })
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn child_observes_parent() {
        let root = Context::new();
        let child = root.child();
        assert!(!child.is_cancelled());

        root.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn parent_ignores_child() {
        let root = Context::new();
        let child = root.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_wakes_waiters() {
        let root = Context::new();
        let grandchild = root.child().child();

        let waiter = {
            let grandchild = grandchild.clone();
            tokio::spawn(async move { grandchild.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        root.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn already_cancelled_resolves_immediately() {
        let ctx = Context::new();
        ctx.cancel();
        tokio::time::timeout(Duration::from_millis(100), ctx.cancelled())
            .await
            .expect("should resolve");
    }
}
