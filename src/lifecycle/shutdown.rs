//! Shutdown coordination for the bridge.

use tokio::sync::broadcast;

use crate::lifecycle::Context;

/// Coordinator for graceful shutdown.
///
/// Long-running tasks either subscribe to the broadcast channel or hold a
/// child of [`Shutdown::context`]; `trigger` fires both.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    root: Context,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            root: Context::new(),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Root cancellation scope; cancelled by [`Shutdown::trigger`].
    pub fn context(&self) -> Context {
        self.root.clone()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.root.cancel();
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.root.is_cancelled()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_reaches_subscribers_and_scopes() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        let session = shutdown.context().child();

        shutdown.trigger();

        assert!(rx.recv().await.is_ok());
        assert!(session.is_cancelled());
        assert!(shutdown.is_triggered());
    }
}
