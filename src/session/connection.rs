//! Canvas session I/O
//!
//! A session binds one WebSocket to one registry identity and runs two loops
//! concurrently:
//!
//! ```text
//!   socket ──► read loop ──► decode ──► registry.publish()
//!                  │
//!                  └── text / ping / pong ──► echo queue ─┐
//!                                                         ▼
//!   mailbox ──────────────────────────────────► write loop ──► socket
//! ```
//!
//! Whichever loop finishes first (or server shutdown) ends the session. The
//! connection is then deleted from the registry and the socket is closed,
//! once, after both loops have stopped.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::protocol::codec::{self, TransportValue};
use crate::registry::{Mailbox, Registry, RegistryError, Topic};
use crate::stats::HubStats;

use super::context::SessionContext;

/// Inbound frames between progress log lines
const LOG_EVERY_FRAMES: u64 = 100;

/// Control frames waiting to be echoed
const ECHO_QUEUE_CAPACITY: usize = 16;

/// Upper bound on the closing handshake during teardown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Why a session ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent a close frame or the stream ended
    ClientClosed,
    /// The registry closed the delivery channel
    MailboxClosed,
    /// Server shutdown
    Shutdown,
}

impl std::fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEnd::ClientClosed => write!(f, "client closed"),
            SessionEnd::MailboxClosed => write!(f, "mailbox closed"),
            SessionEnd::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// One live canvas connection
pub struct Session<R: Registry, S> {
    ctx: SessionContext,
    ws: WebSocketStream<S>,
    mailbox: Mailbox,
    registry: Arc<R>,
    hub_stats: Arc<HubStats>,
}

impl<R, S> Session<R, S>
where
    R: Registry,
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Register an upgraded connection and subscribe it to `topic`
    ///
    /// If the id space is exhausted the socket is closed with "try again
    /// later" and [`RegistryError::Exhausted`] is returned.
    pub async fn open(
        mut ws: WebSocketStream<S>,
        peer_addr: SocketAddr,
        topic: Topic,
        registry: Arc<R>,
        hub_stats: Arc<HubStats>,
    ) -> Result<Self> {
        let (id, mailbox) = match registry.allocate() {
            Ok(allocated) => allocated,
            Err(e) => {
                hub_stats.record_rejection();
                tracing::warn!(peer = %peer_addr, topic = %topic, "Connection rejected: id space exhausted");

                let frame = CloseFrame {
                    code: CloseCode::Again,
                    reason: Utf8Bytes::from_static("connection limit reached"),
                };
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, ws.close(Some(frame))).await;
                return Err(e.into());
            }
        };

        registry.subscribe(id, topic.clone());
        hub_stats.record_session_start();

        tracing::debug!(
            connection_id = %id,
            peer = %peer_addr,
            topic = %topic,
            "Session opened"
        );

        Ok(Self {
            ctx: SessionContext::new(id, peer_addr, topic),
            ws,
            mailbox,
            registry,
            hub_stats,
        })
    }

    /// Session information
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Serve the connection until it ends or `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<SessionEnd> {
        let Session {
            mut ctx,
            ws,
            mut mailbox,
            registry,
            hub_stats,
        } = self;

        let (mut sink, mut stream) = ws.split();
        let (echo_tx, mut echo_rx) = mpsc::channel(ECHO_QUEUE_CAPACITY);
        let mut frames_sent = 0u64;

        let result = tokio::select! {
            result = read_loop(&mut stream, &echo_tx, registry.as_ref(), &hub_stats, &mut ctx) => result,
            result = write_loop(&mut sink, &mut mailbox, &mut echo_rx, &mut frames_sent) => result,
            _ = shutdown.cancelled() => Ok(SessionEnd::Shutdown),
        };

        // Both loops have stopped; tear down exactly once
        registry.delete_connection(ctx.id);
        hub_stats.record_session_end();
        drop(mailbox);
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;

        ctx.stats.frames_sent = frames_sent;
        match &result {
            Ok(end) => tracing::debug!(
                connection_id = %ctx.id,
                reason = %end,
                frames_received = ctx.stats.frames_received,
                frames_sent = ctx.stats.frames_sent,
                duration_ms = ctx.duration().as_millis() as u64,
                "Session closed"
            ),
            Err(e) => tracing::debug!(
                connection_id = %ctx.id,
                error = %e,
                frames_received = ctx.stats.frames_received,
                frames_sent = ctx.stats.frames_sent,
                "Session closed with error"
            ),
        }

        result
    }
}

/// Read frames, publish coordinates, queue control frames for echo
async fn read_loop<R, S>(
    stream: &mut SplitStream<WebSocketStream<S>>,
    echo: &mpsc::Sender<Message>,
    registry: &R,
    hub_stats: &HubStats,
    ctx: &mut SessionContext,
) -> Result<SessionEnd>
where
    R: Registry,
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(message) = stream.next().await {
        match message? {
            Message::Binary(payload) => {
                let coordinate = codec::decode_inbound(&payload).inspect_err(|e| {
                    hub_stats.record_malformed_frame();
                    tracing::debug!(connection_id = %ctx.id, error = %e, "Malformed frame");
                })?;

                ctx.stats.on_frame_received(payload.len());
                if ctx.stats.frames_received % LOG_EVERY_FRAMES == 0 {
                    tracing::debug!(
                        connection_id = %ctx.id,
                        frames = ctx.stats.frames_received,
                        kb = ctx.stats.kilobytes_received(),
                        "Receiving coordinates"
                    );
                }

                let value = TransportValue::new(ctx.id.get(), coordinate);
                match registry.publish(ctx.topic.clone(), value).await {
                    Ok(()) => hub_stats.record_publish(),
                    Err(RegistryError::Closed) => return Ok(SessionEnd::Shutdown),
                    Err(e) => return Err(e.into()),
                }
            }
            Message::Close(frame) => {
                tracing::trace!(connection_id = %ctx.id, frame = ?frame, "Close frame received");
                return Ok(SessionEnd::ClientClosed);
            }
            // Raw frames are never produced while reading
            Message::Frame(_) => {}
            message => {
                ctx.stats.frames_echoed += 1;
                if echo.send(message).await.is_err() {
                    return Ok(SessionEnd::ClientClosed);
                }
            }
        }
    }

    Ok(SessionEnd::ClientClosed)
}

/// Write delivered coordinates and echoed control frames
async fn write_loop<S>(
    sink: &mut SplitSink<WebSocketStream<S>, Message>,
    mailbox: &mut Mailbox,
    echo: &mut mpsc::Receiver<Message>,
    frames_sent: &mut u64,
) -> Result<SessionEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            value = mailbox.recv() => {
                let Some(value) = value else {
                    return Ok(SessionEnd::MailboxClosed);
                };
                let frame = Bytes::copy_from_slice(&value.to_outbound());
                sink.send(Message::Binary(frame)).await?;
                *frames_sent += 1;
            }
            Some(message) = echo.recv() => {
                sink.send(message).await?;
            }
        }
    }
}
