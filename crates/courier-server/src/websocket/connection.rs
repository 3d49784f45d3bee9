//! Live connection handle.
//!
//! A handle never touches the socket. Senders push onto a bounded queue with
//! `try_send`; the connection's writer task drains it, so writes to one
//! transport are serialized and a slow peer never blocks a broadcaster.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use courier_core::{ConnectionId, Role};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// An item on a connection's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A serialized JSON frame, shared across broadcast recipients.
    Text(Arc<String>),
    /// A keepalive ping.
    Ping,
}

/// One authenticated live connection, as seen by its hub.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    role: Role,
    tx: mpsc::Sender<Outbound>,
    /// When this connection was registered.
    pub connected_at: Instant,
    last_seen: Mutex<Instant>,
    dropped_messages: AtomicU64,
    closed: CancellationToken,
}

impl ClientConnection {
    /// Wrap the sending half of an outbound queue. Cancelling `closed`
    /// terminates the connection.
    pub fn new(
        id: ConnectionId,
        role: Role,
        tx: mpsc::Sender<Outbound>,
        closed: CancellationToken,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            role,
            tx,
            connected_at: now,
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            closed,
        }
    }

    /// Role the connection authenticated as.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Queue a text frame.
    ///
    /// Returns `false` if the queue is full, the writer is gone or the
    /// connection is closing; the drop is counted.
    pub fn send(&self, message: Arc<String>) -> bool {
        if !self.closed.is_cancelled() && self.tx.try_send(Outbound::Text(message)).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize `value` and queue it.
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(Arc::new(json)),
            Err(_) => false,
        }
    }

    /// Queue a keepalive ping. A full queue skips the ping without counting
    /// a drop.
    pub fn queue_ping(&self) -> bool {
        self.tx.try_send(Outbound::Ping).is_ok()
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record inbound activity (any frame, including pongs).
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last inbound frame.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Ask the session handler to terminate this connection.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether the connection is closing or its writer has exited.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves once [`close`](Self::close) is called or the parent token is
    /// cancelled.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("dropped_messages", &self.drop_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
