//! Keepalive pings.
//!
//! The keepalive duty only enqueues pings. The writer sends them under the
//! per-write deadline and terminates the connection when one fails, which is
//! what eventually surfaces a dead peer to the read loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::debug;

use super::connection::ClientConnection;

/// Why the keepalive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveResult {
    /// The connection was closed (peer gone, eviction or shutdown).
    Closed,
    /// The writer stopped draining the queue.
    QueueClosed,
}

/// Enqueue a ping every `interval` until the connection closes.
///
/// The first ping goes out one full interval after start. A ping that finds
/// the queue full is skipped; the next tick tries again.
pub async fn run_keepalive(connection: Arc<ClientConnection>, interval: Duration) -> KeepaliveResult {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connection.queue_ping() {
                    continue;
                }
                if connection.is_closed() {
                    return KeepaliveResult::QueueClosed;
                }
                debug!(conn_id = %connection.id, "outbound queue full, ping skipped");
            }
            () = connection.closed() => {
                return KeepaliveResult::Closed;
            }
        }
    }
}
