//! WebSocket session lifecycle: one authenticated client from upgrade
//! through disconnect.
//!
//! Each connection runs three duties:
//!
//! - the read loop (this task): decode, validate, cache, broadcast
//! - the writer: drains the outbound queue onto the socket, one write at a
//!   time, each under the send deadline
//! - the keepalive: enqueues a ping every interval
//!
//! Closing the connection handle stops all three.

use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use courier_core::{ConnectionId, Role, SessionId};
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, instrument, warn};

use super::connection::{ClientConnection, Outbound};
use super::frame::decode_update;
use super::keepalive::run_keepalive;
use crate::config::SessionConfig;
use crate::hub::HubRegistry;
use crate::metrics::{
    FRAMES_DROPPED_TOTAL, LOCATION_UPDATES_TOTAL, SEND_TIMEOUTS_TOTAL, WS_CONNECTION_DURATION_SECONDS,
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// Shared state a session needs.
#[derive(Clone)]
pub struct SessionContext {
    /// Hubs by session.
    pub registry: Arc<HubRegistry>,
    /// Queue, deadline and keepalive tuning.
    pub config: SessionConfig,
    /// Server shutdown token; each connection closes on a child of it.
    pub shutdown: CancellationToken,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// The peer sent a close frame.
    PeerClosed,
    /// The inbound stream ended without a close frame.
    StreamEnded,
    /// Reading from the transport failed.
    ReadError,
    /// The handle was closed by the writer, the hub or shutdown.
    Closed,
}

impl Disconnect {
    fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::StreamEnded => "stream_ended",
            Self::ReadError => "read_error",
            Self::Closed => "closed",
        }
    }
}

/// Run a session on an upgraded socket.
pub async fn run_ws_session(
    ws: WebSocket,
    conn_id: ConnectionId,
    session_id: SessionId,
    role: Role,
    ctx: SessionContext,
) -> Disconnect {
    let (sink, stream) = ws.split();
    run_session(sink, stream, conn_id, session_id, role, ctx).await
}

/// Run a session over any message sink and stream.
///
/// Registers the connection (replaying the counterpart's cached location),
/// relays valid updates until the peer leaves or the connection is closed,
/// then unregisters it.
#[instrument(skip_all, fields(session_id = %session_id, role = %role, conn_id = %conn_id))]
pub async fn run_session<Tx, Rx, E>(
    sink: Tx,
    mut stream: Rx,
    conn_id: ConnectionId,
    session_id: SessionId,
    role: Role,
    ctx: SessionContext,
) -> Disconnect
where
    Tx: Sink<Message> + Unpin + Send + 'static,
    Tx::Error: Display + Send,
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (tx, rx) = mpsc::channel(ctx.config.send_queue_capacity.max(1));
    let connection = Arc::new(ClientConnection::new(
        conn_id,
        role,
        tx,
        ctx.shutdown.child_token(),
    ));

    let (hub, replay) = ctx.registry.join(&session_id, &connection);
    info!(replayed = replay.is_some(), "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let writer = tokio::spawn(
        run_writer(sink, rx, Arc::clone(&connection), ctx.config.send_timeout)
            .instrument(Span::current()),
    );
    let keepalive = tokio::spawn(
        run_keepalive(Arc::clone(&connection), ctx.config.keepalive_interval)
            .instrument(Span::current()),
    );

    let reason = read_loop(&mut stream, &connection, &session_id, &ctx.registry).await;

    connection.close();
    let _ = hub.remove_client(&connection.id);
    let _ = keepalive.await;
    let _ = writer.await;

    info!(
        reason = reason.as_str(),
        dropped = connection.drop_count(),
        duration_secs = connection.age().as_secs(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    reason
}

async fn read_loop<Rx, E>(
    stream: &mut Rx,
    connection: &ClientConnection,
    session_id: &SessionId,
    registry: &HubRegistry,
) -> Disconnect
where
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let next = tokio::select! {
            () = connection.closed() => return Disconnect::Closed,
            next = stream.next() => next,
        };
        let message = match next {
            None => return Disconnect::StreamEnded,
            Some(Err(err)) => {
                debug!(error = %err, "read failed");
                return Disconnect::ReadError;
            }
            Some(Ok(message)) => message,
        };
        connection.mark_alive();

        match message {
            Message::Text(text) => {
                relay_update(text.as_str(), connection.role(), session_id, registry);
            }
            Message::Close(_) => return Disconnect::PeerClosed,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

fn relay_update(text: &str, role: Role, session_id: &SessionId, registry: &HubRegistry) {
    match decode_update(text, role) {
        Ok((kind, location)) => {
            let recipients = registry.publish(session_id, kind, location);
            counter!(LOCATION_UPDATES_TOTAL, "kind" => kind.as_str(), "source" => "ws").increment(1);
            debug!(kind = kind.as_str(), recipients, "update relayed");
        }
        Err(reason) => {
            counter!(FRAMES_DROPPED_TOTAL, "reason" => reason.as_str()).increment(1);
            debug!(reason = reason.as_str(), "frame dropped");
        }
    }
}

/// Drain `rx` onto `sink` until the connection closes.
///
/// Every write is bounded by `send_timeout`. A text write that times out is
/// abandoned and the writer moves on; a transport error or a failed ping
/// closes the connection. On exit a close frame is attempted.
pub(crate) async fn run_writer<Tx>(
    mut sink: Tx,
    mut rx: mpsc::Receiver<Outbound>,
    connection: Arc<ClientConnection>,
    send_timeout: Duration,
) where
    Tx: Sink<Message> + Unpin,
    Tx::Error: Display + Send,
{
    loop {
        let next = tokio::select! {
            () = connection.closed() => break,
            next = rx.recv() => next,
        };
        let Some(outbound) = next else { break };

        let started = Instant::now();
        match outbound {
            Outbound::Text(text) => {
                let frame = Message::Text(String::clone(&text).into());
                match tokio::time::timeout(send_timeout, sink.send(frame)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        debug!(error = %err, "write failed");
                        break;
                    }
                    Err(_) => {
                        counter!(SEND_TIMEOUTS_TOTAL).increment(1);
                        warn!(
                            waited_ms = started.elapsed().as_millis(),
                            "write timed out, message abandoned"
                        );
                    }
                }
            }
            Outbound::Ping => {
                let ping = Message::Ping(Vec::<u8>::new().into());
                match tokio::time::timeout(send_timeout, sink.send(ping)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        debug!(error = %err, "keepalive ping failed");
                        break;
                    }
                    Err(_) => {
                        counter!(SEND_TIMEOUTS_TOTAL).increment(1);
                        warn!("keepalive ping timed out");
                        break;
                    }
                }
            }
        }
    }

    connection.close();
    let _ = tokio::time::timeout(send_timeout, sink.close()).await;
}
