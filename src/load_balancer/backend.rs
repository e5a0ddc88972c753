//! Backend instance abstraction.
//!
//! # Responsibilities
//! - Represent a single backend instance of a service
//! - Track active calls and streams (for Least Connections)
//! - Enforce max concurrent use per instance

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

/// A single backend instance.
#[derive(Debug)]
pub struct Backend {
    /// Address as configured (`host:port`).
    pub addr: String,
    /// Pre-calculated base URL for performance.
    pub base_url: Url,
    /// Maximum concurrent calls/streams allowed.
    pub max_connections: usize,
    /// Number of in-flight calls/streams.
    pub active_connections: AtomicUsize,
}

impl Backend {
    pub fn new(addr: impl Into<String>, max_connections: usize) -> Result<Self, url::ParseError> {
        let addr = addr.into();
        let base_url = Url::parse(&format!("http://{}", addr))?;
        Ok(Self {
            addr,
            base_url,
            max_connections,
            active_connections: AtomicUsize::new(0),
        })
    }

    /// Current number of in-flight calls/streams.
    pub fn load(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// URL for an endpoint path with the given scheme (`http` or `ws`).
    pub fn endpoint_url(&self, scheme: &str, service: &str, endpoint: &str) -> Url {
        let mut url = self.base_url.clone();
        // "http" → "ws" is a special-scheme to special-scheme change and always accepted.
        let _ = url.set_scheme(scheme);
        url.set_path(&format!("/{}/{}", service, endpoint.trim_start_matches('/')));
        url
    }

    /// Try to create a guard that holds one connection slot.
    pub fn try_create_guard(self: &Arc<Self>) -> Option<BackendConnectionGuard> {
        let mut prev = self.active_connections.load(Ordering::Relaxed);
        loop {
            if prev >= self.max_connections {
                return None;
            }
            match self.active_connections.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }
        Some(BackendConnectionGuard {
            backend: self.clone(),
        })
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.addr)
    }
}

/// RAII guard over one connection slot on a backend.
#[derive(Debug)]
pub struct BackendConnectionGuard {
    pub backend: Arc<Backend>,
}

impl Deref for BackendConnectionGuard {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for BackendConnectionGuard {
    fn drop(&mut self) {
        self.backend.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_respects_limit() {
        let backend = Arc::new(Backend::new("127.0.0.1:9000", 2).unwrap());

        let g1 = backend.try_create_guard().unwrap();
        let _g2 = backend.try_create_guard().unwrap();
        assert!(backend.try_create_guard().is_none());
        assert_eq!(backend.load(), 2);

        drop(g1);
        assert_eq!(backend.load(), 1);
        assert!(backend.try_create_guard().is_some());
    }

    #[test]
    fn endpoint_urls() {
        let backend = Backend::new("localhost:9000", 1).unwrap();
        assert_eq!(
            backend.endpoint_url("http", "greeter", "Say.Hello").as_str(),
            "http://localhost:9000/greeter/Say.Hello"
        );
        assert_eq!(
            backend.endpoint_url("ws", "greeter", "Say.Stream").as_str(),
            "ws://localhost:9000/greeter/Say.Stream"
        );
    }
}
