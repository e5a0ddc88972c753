//! HTTP/WebSocket backend transport.
//!
//! # Responsibilities
//! - Unary calls: POST the payload to `http://{instance}/{service}/{endpoint}`
//! - Streams: WebSocket client to `ws://{instance}/{service}/{endpoint}`
//! - Translate backend error bodies into `TransportError::Status`
//!
//! # Design Decisions
//! - One pooled hyper client shared by all unary calls
//! - The call deadline bounds the unary exchange and the stream connect,
//!   never the lifetime of an open stream
//! - A stream's reader runs on its own task; a backend close ends the
//!   response channel once buffered chunks are read

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request as WsRequest;
use tokio_tungstenite::tungstenite::http::header::CONTENT_TYPE as WS_CONTENT_TYPE;
use tokio_tungstenite::tungstenite::http::HeaderValue as WsHeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::lifecycle::Context;
use crate::load_balancer::backend::BackendConnectionGuard;
use crate::transport::{
    BackendStream, BoxFuture, CallOptions, CallRequest, ResponseReader, Transport, TransportError,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Chunks buffered between the backend socket and the downstream relay.
const STREAM_BUFFER: usize = 32;

/// Transport speaking HTTP for calls and WebSocket for streams.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector, Body>,
    connect_timeout: Duration,
    max_response_size: usize,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration, max_response_size: usize) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            connect_timeout,
            max_response_size,
        }
    }

    async fn exchange(
        &self,
        slot: &BackendConnectionGuard,
        request: CallRequest,
    ) -> Result<Bytes, TransportError> {
        let url = slot.endpoint_url("http", &request.service, &request.endpoint);
        let http_request = Request::builder()
            .method(Method::POST)
            .uri(url.as_str())
            .header(header::CONTENT_TYPE, request.content_type.as_str())
            .body(Body::from(request.payload))
            .map_err(|e| TransportError::Io(e.to_string()))?;

        let response = self
            .client
            .request(http_request)
            .await
            .map_err(|e| TransportError::Unavailable(format!("{}: {}", slot.addr, e)))?;

        let status = response.status();
        let body = axum::body::to_bytes(Body::new(response.into_body()), self.max_response_size)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(status_error(status.as_u16(), &request.service, &body))
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ErrorBody {
    id: String,
    code: u16,
    detail: String,
}

/// Build a `Status` error from a non-2xx backend response.
fn status_error(status: u16, service: &str, body: &[u8]) -> TransportError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => TransportError::Status {
            code: if parsed.code == 0 { status } else { parsed.code },
            id: if parsed.id.is_empty() { service.to_string() } else { parsed.id },
            detail: parsed.detail,
        },
        Err(_) => TransportError::Status {
            code: status,
            id: service.to_string(),
            detail: String::from_utf8_lossy(body).into_owned(),
        },
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

impl Transport for HttpTransport {
    fn call(&self, request: CallRequest, options: CallOptions) -> BoxFuture<'_, Result<Bytes, TransportError>> {
        Box::pin(async move {
            let slot = take_slot(&options)?;
            tracing::debug!(
                service = %request.service,
                endpoint = %request.endpoint,
                backend = %slot.addr,
                "Forwarding call"
            );

            match options.timeout {
                Some(limit) => tokio::time::timeout(limit, self.exchange(&slot, request))
                    .await
                    .map_err(|_| TransportError::Timeout)?,
                None => self.exchange(&slot, request).await,
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
            let url = slot.endpoint_url("ws", &request.service, &request.endpoint);
            let limit = options.timeout.unwrap_or(self.connect_timeout);

            let handshake = stream_handshake(url.as_str(), &request.content_type)?;

            let (socket, _) = tokio::time::timeout(limit, tokio_tungstenite::connect_async(handshake))
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(|e| TransportError::Unavailable(format!("{}: {}", slot.addr, e)))?;

            tracing::debug!(
                service = %request.service,
                endpoint = %request.endpoint,
                backend = %slot.addr,
                "Backend stream opened"
            );

            let stream_ctx = ctx.child();
            let (sink, source) = socket.split();
            let (tx, rx) = mpsc::channel(STREAM_BUFFER);
            tokio::spawn(pump_backend(source, tx, stream_ctx.clone()));

            Ok(Box::new(WsBackendStream {
                sink,
                reader: Some(ChannelReader { rx }),
                ctx: stream_ctx,
                closed: false,
                _slot: slot,
            }) as Box<dyn BackendStream>)
        })
    }
}

/// Client handshake for a backend stream, declaring the call's content type.
fn stream_handshake(url: &str, content_type: &str) -> Result<WsRequest, TransportError> {
    let mut handshake = url
        .into_client_request()
        .map_err(|e| TransportError::Io(format!("invalid stream url {}: {}", url, e)))?;
    let value = WsHeaderValue::from_str(content_type)
        .map_err(|e| TransportError::Io(format!("invalid content type {:?}: {}", content_type, e)))?;
    handshake.headers_mut().insert(WS_CONTENT_TYPE, value);
    Ok(handshake)
}

/// Move backend messages onto the response channel until the backend
/// closes or the stream context is cancelled.
async fn pump_backend(
    mut source: SplitStream<WsStream>,
    tx: mpsc::Sender<Result<Bytes, TransportError>>,
    ctx: Context,
) {
    loop {
        let message = tokio::select! {
            _ = ctx.cancelled() => break,
            message = source.next() => message,
        };

        let chunk = match message {
            Some(Ok(Message::Binary(data))) => Ok(data),
            Some(Ok(Message::Text(text))) => Ok(Bytes::copy_from_slice(text.as_bytes())),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => Err(TransportError::Io(e.to_string())),
        };

        let failed = chunk.is_err();
        if tx.send(chunk).await.is_err() || failed {
            break;
        }
    }
    // Dropping `tx` ends the response channel after any buffered chunks.
}

struct WsBackendStream {
    sink: SplitSink<WsStream, Message>,
    reader: Option<ChannelReader>,
    ctx: Context,
    closed: bool,
    _slot: BackendConnectionGuard,
}

impl BackendStream for WsBackendStream {
    fn send(&mut self, payload: Bytes) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if self.closed || self.ctx.is_cancelled() {
                return Err(TransportError::Closed);
            }
            self.sink
                .send(Message::Binary(payload))
                .await
                .map_err(|e| TransportError::Io(e.to_string()))
        })
    }

    fn response(&mut self) -> Option<Box<dyn ResponseReader>> {
        self.reader.take().map(|r| Box::new(r) as Box<dyn ResponseReader>)
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if self.closed {
                return Ok(());
            }
            self.closed = true;
            let result = self
                .sink
                .close()
                .await
                .map_err(|e| TransportError::Io(e.to_string()));
            self.ctx.cancel();
            result
        })
    }

    fn context(&self) -> Context {
        self.ctx.clone()
    }
}

struct ChannelReader {
    rx: mpsc::Receiver<Result<Bytes, TransportError>>,
}

impl ResponseReader for ChannelReader {
    fn read(&mut self) -> BoxFuture<'_, Result<Bytes, TransportError>> {
        Box::pin(async move { self.rx.recv().await.unwrap_or(Err(TransportError::Closed)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::{backend::Backend, round_robin::RoundRobin, Selector};
    use std::sync::Arc;

    #[test]
    fn parses_structured_backend_errors() {
        let err = status_error(
            500,
            "greeter",
            br#"{"id":"go.greeter","code":408,"detail":"took too long"}"#,
        );
        assert_eq!(
            err,
            TransportError::Status {
                code: 408,
                id: "go.greeter".into(),
                detail: "took too long".into()
            }
        );
    }

    #[test]
    fn plain_backend_errors_keep_http_status() {
        let err = status_error(502, "greeter", b"bad gateway");
        assert_eq!(
            err,
            TransportError::Status {
                code: 502,
                id: "greeter".into(),
                detail: "bad gateway".into()
            }
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backends: Arc<[Arc<Backend>]> = vec![Arc::new(Backend::new(addr.to_string(), 4).unwrap())].into();
        let options = CallOptions::new(Selector::new(backends, Arc::new(RoundRobin::new())));
        let transport = HttpTransport::new(Duration::from_secs(1), 1024);

        let err = transport
            .call(
                CallRequest::new("greeter", "Say.Hello", Bytes::new(), "application/json"),
                options,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)));
    }

    #[tokio::test]
    async fn stream_declares_content_type() {
        use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request as Upgrade, Response as Accept};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let _ws = tokio_tungstenite::accept_hdr_async(tcp, move |req: &Upgrade, resp: Accept| -> Result<Accept, ErrorResponse> {
                let _ = seen_tx.send((req.uri().path().to_string(), req.headers().get("content-type").cloned()));
                Ok(resp)
            })
            .await
            .unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        let backends: Arc<[Arc<Backend>]> = vec![Arc::new(Backend::new(addr.to_string(), 4).unwrap())].into();
        let options = CallOptions::new(Selector::new(backends, Arc::new(RoundRobin::new())));
        let transport = HttpTransport::new(Duration::from_secs(1), 1024);
        let ctx = Context::new();

        let mut stream = transport
            .stream(
                &ctx,
                CallRequest::new("greeter", "Say.Stream", Bytes::new(), "application/proto").streaming(),
                options,
            )
            .await
            .unwrap();

        let (path, content_type) = seen_rx.await.unwrap();
        assert_eq!(path, "/greeter/Say.Stream");
        assert_eq!(content_type.unwrap(), "application/proto");
        let _ = stream.close().await;
    }
}
