//! In-process transport.
//!
//! Unary calls are served by registered handlers; streams are handed to
//! whoever awaits `next_stream`, which then plays the backend side.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};

use crate::lifecycle::Context;
use crate::load_balancer::backend::BackendConnectionGuard;
use crate::transport::{
    BackendStream, BoxFuture, CallOptions, CallRequest, ResponseReader, Transport, TransportError,
};

pub type UnaryHandler =
    Arc<dyn Fn(CallRequest) -> BoxFuture<'static, Result<Bytes, TransportError>> + Send + Sync>;

/// Transport whose backends live in the same process.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

struct Inner {
    handlers: RwLock<HashMap<(String, String), UnaryHandler>>,
    accepted_tx: mpsc::UnboundedSender<StreamPeer>,
    accepted_rx: Mutex<mpsc::UnboundedReceiver<StreamPeer>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                handlers: RwLock::new(HashMap::new()),
                accepted_tx,
                accepted_rx: Mutex::new(accepted_rx),
            }),
        }
    }

    /// Register a unary handler for `service`/`endpoint`.
    pub fn handle<F, Fut>(&self, service: &str, endpoint: &str, handler: F)
    where
        F: Fn(CallRequest) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Bytes, TransportError>> + Send + 'static,
    {
        let handler: UnaryHandler =
            Arc::new(move |req| Box::pin(handler(req)) as BoxFuture<'static, Result<Bytes, TransportError>>);
        if let Ok(mut handlers) = self.inner.handlers.write() {
            handlers.insert((service.to_string(), endpoint.to_string()), handler);
        }
    }

    /// Wait for the next stream opened through this transport.
    pub async fn next_stream(&self) -> Option<StreamPeer> {
        self.inner.accepted_rx.lock().await.recv().await
    }

    fn handler(&self, service: &str, endpoint: &str) -> Option<UnaryHandler> {
        self.inner
            .handlers
            .read()
            .ok()?
            .get(&(service.to_string(), endpoint.to_string()))
            .cloned()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn take_slot(options: &CallOptions) -> Result<BackendConnectionGuard, TransportError> {
    options.selector.next().ok_or_else(|| {
        TransportError::Unavailable(format!(
            "{} instance(s), none selectable",
            options.selector.backends().len()
        ))
    })
}

impl Transport for MemoryTransport {
    fn call(&self, request: CallRequest, options: CallOptions) -> BoxFuture<'_, Result<Bytes, TransportError>> {
        Box::pin(async move {
            let _slot = take_slot(&options)?;
            let handler = self.handler(&request.service, &request.endpoint).ok_or_else(|| {
                TransportError::Status {
                    code: 404,
                    id: request.service.clone(),
                    detail: format!("unknown endpoint {}", request.endpoint),
                }
            })?;

            match options.timeout {
                Some(limit) => tokio::time::timeout(limit, handler(request))
                    .await
                    .map_err(|_| TransportError::Timeout)?,
                None => handler(request).await,
            }
        })
    }

    fn stream<'a>(
        &'a self,
        ctx: &'a Context,
        request: CallRequest,
        options: CallOptions,
    ) -> BoxFuture<'a, Result<Box<dyn BackendStream>, TransportError>> {
        Box::pin(async move {
            let slot = take_slot(&options)?;
            let stream_ctx = ctx.child();
            let (to_backend_tx, to_backend_rx) = mpsc::unbounded_channel();
            let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
            let closes = Arc::new(AtomicUsize::new(0));

            let peer = StreamPeer {
                request,
                inbound: to_backend_rx,
                outbound: Some(to_client_tx),
                ctx: stream_ctx.clone(),
                closes: closes.clone(),
            };
            self.inner
                .accepted_tx
                .send(peer)
                .map_err(|_| TransportError::Unavailable("transport shut down".into()))?;

            Ok(Box::new(MemoryStream {
                tx: Some(to_backend_tx),
                reader: Some(MemoryReader { rx: to_client_rx }),
                ctx: stream_ctx,
                closes,
                _slot: slot,
            }) as Box<dyn BackendStream>)
        })
    }
}

struct MemoryStream {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    reader: Option<MemoryReader>,
    ctx: Context,
    closes: Arc<AtomicUsize>,
    _slot: BackendConnectionGuard,
}

impl BackendStream for MemoryStream {
    fn send(&mut self, payload: Bytes) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if self.ctx.is_cancelled() {
                return Err(TransportError::Closed);
            }
            let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
            tx.send(payload).map_err(|_| TransportError::Closed)
        })
    }

    fn response(&mut self) -> Option<Box<dyn ResponseReader>> {
        self.reader.take().map(|r| Box::new(r) as Box<dyn ResponseReader>)
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.tx.take();
            self.ctx.cancel();
            Ok(())
        })
    }

    fn context(&self) -> Context {
        self.ctx.clone()
    }
}

struct MemoryReader {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl ResponseReader for MemoryReader {
    fn read(&mut self) -> BoxFuture<'_, Result<Bytes, TransportError>> {
        Box::pin(async move { self.rx.recv().await.ok_or(TransportError::Closed) })
    }
}

/// Backend side of a stream opened through `MemoryTransport`.
pub struct StreamPeer {
    pub request: CallRequest,
    inbound: mpsc::UnboundedReceiver<Bytes>,
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
    ctx: Context,
    closes: Arc<AtomicUsize>,
}

impl StreamPeer {
    /// Next frame from the client. `None` once the stream is closed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.inbound.recv().await
    }

    /// Send a chunk to the client.
    pub fn send(&self, chunk: impl Into<Bytes>) -> Result<(), TransportError> {
        let tx = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        tx.send(chunk.into()).map_err(|_| TransportError::Closed)
    }

    /// End the response stream. Chunks already sent are still delivered;
    /// cancel `context()` instead to abort.
    pub fn finish(&mut self) {
        self.outbound.take();
    }

    /// How many times the bridge closed this stream.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::{backend::Backend, round_robin::RoundRobin, Selector};

    fn options(instances: &[&str]) -> CallOptions {
        let backends: Vec<Arc<Backend>> = instances
            .iter()
            .map(|addr| Arc::new(Backend::new(*addr, 8).unwrap()))
            .collect();
        CallOptions::new(Selector::new(backends.into(), Arc::new(RoundRobin::new())))
    }

    #[tokio::test]
    async fn unary_handler_is_called() {
        let transport = MemoryTransport::new();
        transport.handle("greeter", "Say.Hello", |req: CallRequest| async move { Ok(req.payload) });

        let reply = transport
            .call(
                CallRequest::new("greeter", "Say.Hello", Bytes::from_static(b"hi"), "application/json"),
                options(&["127.0.0.1:1"]),
            )
            .await
            .unwrap();
        assert_eq!(&reply[..], b"hi");
    }

    #[tokio::test]
    async fn no_instances_is_unavailable() {
        let transport = MemoryTransport::new();
        let err = transport
            .call(
                CallRequest::new("greeter", "Say.Hello", Bytes::new(), "application/json"),
                options(&[]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)));
    }

    #[tokio::test]
    async fn stream_close_reaches_peer() {
        let transport = MemoryTransport::new();
        let ctx = Context::new();
        let request = CallRequest::new("greeter", "Say.Stream", Bytes::new(), "application/json").streaming();

        let mut stream = transport.stream(&ctx, request, options(&["127.0.0.1:1"])).await.unwrap();
        let mut peer = transport.next_stream().await.unwrap();
        assert!(peer.request.streaming);

        stream.send(Bytes::from_static(b"f1")).await.unwrap();
        assert_eq!(peer.recv().await.unwrap(), Bytes::from_static(b"f1"));

        peer.send("r1").unwrap();
        let mut reader = stream.response().unwrap();
        assert!(stream.response().is_none());
        assert_eq!(reader.read().await.unwrap(), Bytes::from_static(b"r1"));

        stream.close().await.unwrap();
        assert!(peer.recv().await.is_none());
        assert!(stream.context().is_cancelled());
        assert_eq!(peer.close_count(), 1);
        assert!(!ctx.is_cancelled());
    }
}
