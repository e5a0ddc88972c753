//! Backend transport contract.
//!
//! # Responsibilities
//! - Define how the bridge issues unary calls and opens streams
//! - Classify transport failures (benign vs. real)
//!
//! # Data Flow
//! ```text
//! CallRequest + CallOptions (selector, deadline)
//!     → Transport::call   → response bytes
//!     → Transport::stream → BackendStream
//!                              ├── send(frame)        (upstream)
//!                              ├── response().read()  (downstream)
//!                              ├── close()            (once)
//!                              └── context()          (done when the stream ends)
//! ```
//!
//! # Design Decisions
//! - Object-safe traits with boxed futures so servers hold `Arc<dyn Transport>`
//! - The response reader is taken out of the stream once, so reading and
//!   sending can proceed from different tasks without locking
//! - Closing a stream cancels its context

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::lifecycle::Context;
use crate::load_balancer::Selector;

pub mod http;
pub mod memory;

pub use http::HttpTransport;
pub use memory::{MemoryTransport, StreamPeer};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure reported by a transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("context canceled")]
    Cancelled,

    #[error("stream closed")]
    Closed,

    #[error("no backend available: {0}")]
    Unavailable(String),

    #[error("deadline exceeded")]
    Timeout,

    /// Error reported by the backend itself.
    #[error("{detail}")]
    Status { code: u16, id: String, detail: String },

    #[error("{0}")]
    Io(String),
}

impl TransportError {
    /// Whether this is an ordinary end of stream rather than a failure.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Closed)
    }
}

/// Outbound call description.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub service: String,
    pub endpoint: String,
    pub payload: Bytes,
    pub content_type: String,
    pub streaming: bool,
}

impl CallRequest {
    pub fn new(
        service: impl Into<String>,
        endpoint: impl Into<String>,
        payload: Bytes,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            endpoint: endpoint.into(),
            payload,
            content_type: content_type.into(),
            streaming: false,
        }
    }

    /// Mark the request as a stream.
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }
}

/// Per-call routing and deadline.
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub selector: Selector,
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Issues calls and opens streams against backend services.
pub trait Transport: Send + Sync + 'static {
    fn call(&self, request: CallRequest, options: CallOptions) -> BoxFuture<'_, Result<Bytes, TransportError>>;

    /// Open a stream whose context is a child of `ctx`.
    fn stream<'a>(
        &'a self,
        ctx: &'a Context,
        request: CallRequest,
        options: CallOptions,
    ) -> BoxFuture<'a, Result<Box<dyn BackendStream>, TransportError>>;
}

/// A full-duplex backend stream.
pub trait BackendStream: Send {
    fn send(&mut self, payload: Bytes) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Take the response reader. Returns `None` after the first call.
    fn response(&mut self) -> Option<Box<dyn ResponseReader>>;

    /// Tell the backend no more input will arrive and release the stream.
    fn close(&mut self) -> BoxFuture<'_, Result<(), TransportError>>;

    fn context(&self) -> Context;
}

/// Receiving half of a backend stream.
pub trait ResponseReader: Send {
    /// Next chunk. `Closed` or `Cancelled` once the stream has ended.
    fn read(&mut self) -> BoxFuture<'_, Result<Bytes, TransportError>>;
}
