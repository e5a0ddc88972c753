//! Bridge session: one upgraded connection paired with one backend stream.
//!
//! # Data Flow
//! ```text
//!                 ┌──────────── upstream relay ────────────┐
//! client frames ──┤ skip control frames, forward data       ├──▶ backend send
//!                 │ close backend stream exactly once        │
//!                 └─────────────────────────────────────────┘
//!                 ┌─────────── downstream relay ───────────┐
//! client socket ◀─┤ frame per negotiated op, flush per write ├─── backend read
//!                 └─────────────────────────────────────────┘
//! ```
//!
//! # Design Decisions
//! - Each relay runs on its own task and owns one half of the socket
//! - No channel between the relays; they coordinate only through the
//!   cancellation scopes (session and backend stream)
//! - The downstream relay cancels the session scope when it exits, which
//!   wakes the upstream relay
//! - The socket is reunited and closed only after both relays return

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::frame::Utf8Bytes;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

use crate::codec::{Encoding, FramingOp};
use crate::lifecycle::Context;
use crate::net::SessionId;
use crate::observability::metrics;
use crate::payload::Payload;
use crate::transport::{BackendStream, ResponseReader, TransportError};

/// Why a relay direction stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayExit {
    /// The session scope was cancelled.
    Cancelled,
    /// The backend stream ended.
    BackendDone,
    /// The client went away, closed normally or sent no close status.
    BenignClose,
    /// Any other read or write failure.
    Transport(TransportError),
}

impl RelayExit {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// How both relay directions ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub upstream: RelayExit,
    pub downstream: RelayExit,
}

/// Owns a backend stream and closes it exactly once.
///
/// `close` consumes the guard. If the guard is dropped without it (for
/// example when the relay task panics), the close is spawned instead.
pub struct StreamGuard {
    stream: Option<Box<dyn BackendStream>>,
}

impl StreamGuard {
    pub fn new(stream: Box<dyn BackendStream>) -> Self {
        Self { stream: Some(stream) }
    }

    pub async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        match self.stream.as_mut() {
            Some(stream) => stream.send(payload).await,
            None => Err(TransportError::Closed),
        }
    }

    pub async fn close(mut self) -> Result<(), TransportError> {
        match self.stream.take() {
            Some(mut stream) => stream.close().await,
            None => Ok(()),
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = stream.close().await {
                        tracing::debug!(error = %e, "Deferred backend stream close failed");
                    }
                });
            }
            Err(_) => tracing::warn!("Backend stream dropped outside a runtime; close skipped"),
        }
    }
}

/// An active streaming bridge.
pub struct BridgeSession<S> {
    id: SessionId,
    socket: WebSocketStream<S>,
    stream: Box<dyn BackendStream>,
    op: FramingOp,
    encoding: Encoding,
    ctx: Context,
}

impl<S> BridgeSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// `ctx` is the session scope; the backend stream should have been
    /// opened under it.
    pub fn new(
        id: SessionId,
        socket: WebSocketStream<S>,
        stream: Box<dyn BackendStream>,
        op: FramingOp,
        encoding: Encoding,
        ctx: Context,
    ) -> Self {
        Self {
            id,
            socket,
            stream,
            op,
            encoding,
            ctx,
        }
    }

    /// Relay until both directions have exited, then close the connection.
    pub async fn run(mut self) -> SessionOutcome {
        let id = self.id;
        let backend_ctx = self.stream.context();
        let reader = self.stream.response();
        let (sink, source) = self.socket.split();

        tracing::debug!(session_id = %id, op = ?self.op, "Session relaying");

        let session_ctx = self.ctx.clone();
        let downstream_backend_ctx = backend_ctx.clone();
        let op = self.op;
        let downstream = tokio::spawn(async move {
            let result = relay_downstream(reader, sink, op, &session_ctx, &downstream_backend_ctx).await;
            session_ctx.cancel();
            result
        });

        let upstream = tokio::spawn(relay_upstream(
            source,
            StreamGuard::new(self.stream),
            self.encoding,
            self.ctx.clone(),
            backend_ctx,
        ));

        let (upstream, downstream) = tokio::join!(upstream, downstream);
        // The session scope ends with the session regardless of which side stopped.
        self.ctx.cancel();

        let (upstream, downstream) = match (upstream, downstream) {
            (Ok((up_exit, source)), Ok((down_exit, sink))) => {
                match source.reunite(sink) {
                    Ok(socket) => close_socket(id, socket).await,
                    Err(e) => tracing::warn!(session_id = %id, error = %e, "Failed to reunite socket halves"),
                }
                (up_exit, down_exit)
            }
            (up, down) => {
                let up = up.map(|(exit, _)| exit).unwrap_or_else(|e| join_failure("upstream", e));
                let down = down.map(|(exit, _)| exit).unwrap_or_else(|e| join_failure("downstream", e));
                (up, down)
            }
        };

        log_exit(id, "upstream", &upstream);
        log_exit(id, "downstream", &downstream);
        tracing::debug!(session_id = %id, "Session closed");

        SessionOutcome { upstream, downstream }
    }
}

fn join_failure(direction: &'static str, err: tokio::task::JoinError) -> RelayExit {
    RelayExit::Transport(TransportError::Io(format!("{} relay aborted: {}", direction, err)))
}

fn log_exit(id: SessionId, direction: &'static str, exit: &RelayExit) {
    match exit {
        RelayExit::Transport(e) => {
            tracing::warn!(session_id = %id, direction, error = %e, "Relay ended with error")
        }
        other => tracing::debug!(session_id = %id, direction, exit = ?other, "Relay ended"),
    }
}

async fn close_socket<S>(id: SessionId, mut socket: WebSocketStream<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match socket.close(None).await {
        Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => {}
        Err(e) => tracing::debug!(session_id = %id, error = %e, "Connection close failed"),
    }
}

/// Backend → client.
async fn relay_downstream<S>(
    reader: Option<Box<dyn ResponseReader>>,
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    op: FramingOp,
    ctx: &Context,
    backend_ctx: &Context,
) -> (RelayExit, SplitSink<WebSocketStream<S>, Message>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(mut reader) = reader else {
        return (RelayExit::BackendDone, sink);
    };

    let exit = loop {
        if ctx.is_cancelled() {
            break RelayExit::Cancelled;
        }
        if backend_ctx.is_cancelled() {
            break RelayExit::BackendDone;
        }

        let chunk = tokio::select! {
            _ = ctx.cancelled() => break RelayExit::Cancelled,
            _ = backend_ctx.cancelled() => break RelayExit::BackendDone,
            chunk = reader.read() => chunk,
        };

        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) if e.is_benign() => break RelayExit::BackendDone,
            Err(e) => break RelayExit::Transport(e),
        };

        let message = frame_message(op, chunk);

        // `send` flushes after every message.
        if let Err(e) = sink.send(message).await {
            break write_failure(e);
        }
        metrics::record_frame("downstream");
    };

    (exit, sink)
}

/// Client → backend. Closes the backend stream on every exit path.
async fn relay_upstream<S>(
    mut source: SplitStream<WebSocketStream<S>>,
    mut stream: StreamGuard,
    encoding: Encoding,
    ctx: Context,
    backend_ctx: Context,
) -> (RelayExit, SplitStream<WebSocketStream<S>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let exit = loop {
        if backend_ctx.is_cancelled() {
            break RelayExit::BackendDone;
        }
        if ctx.is_cancelled() {
            break RelayExit::Cancelled;
        }

        let message = tokio::select! {
            _ = backend_ctx.cancelled() => break RelayExit::BackendDone,
            _ = ctx.cancelled() => break RelayExit::Cancelled,
            message = source.next() => message,
        };

        let data = match message {
            Some(Ok(Message::Binary(data))) => data,
            Some(Ok(Message::Text(text))) => Bytes::copy_from_slice(text.as_bytes()),
            Some(Ok(Message::Close(frame))) => break classify_close(frame.as_ref()),
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
            Some(Err(e)) => break classify_read_error(e),
            None => break RelayExit::BenignClose,
        };

        let payload = Payload::from_frame(data, encoding);
        if let Err(e) = stream.send(payload.bytes).await {
            break if e.is_benign() {
                RelayExit::BackendDone
            } else {
                RelayExit::Transport(e)
            };
        }
        metrics::record_frame("upstream");
    };

    if let Err(e) = stream.close().await {
        tracing::debug!(error = %e, "Backend stream close failed");
    }

    (exit, source)
}

/// Mark a backend chunk for the connection. A chunk that is not UTF-8 goes
/// out as a binary frame so its bytes are delivered unchanged.
fn frame_message(op: FramingOp, chunk: Bytes) -> Message {
    match op {
        FramingOp::Binary => Message::Binary(chunk),
        FramingOp::Text => match Utf8Bytes::try_from(chunk.clone()) {
            Ok(text) => Message::Text(text),
            Err(_) => {
                tracing::debug!(len = chunk.len(), "Non-UTF-8 chunk on text session sent as binary");
                Message::Binary(chunk)
            }
        },
    }
}

fn classify_close(frame: Option<&CloseFrame>) -> RelayExit {
    match frame {
        None => RelayExit::BenignClose,
        Some(frame) => match frame.code {
            CloseCode::Normal | CloseCode::Away | CloseCode::Status => RelayExit::BenignClose,
            code => RelayExit::Transport(TransportError::Io(format!(
                "connection closed with {}: {}",
                u16::from(code),
                &*frame.reason
            ))),
        },
    }
}

fn classify_read_error(err: WsError) -> RelayExit {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => RelayExit::BenignClose,
        other => RelayExit::Transport(TransportError::Io(other.to_string())),
    }
}

fn write_failure(err: WsError) -> RelayExit {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => RelayExit::BenignClose,
        other => RelayExit::Transport(TransportError::Io(other.to_string())),
    }
}
