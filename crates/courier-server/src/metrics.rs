//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup,
/// before anything is recorded; a second install fails.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Accepted location updates (counter, labels: kind, source).
pub const LOCATION_UPDATES_TOTAL: &str = "location_updates_total";
/// Inbound frames dropped without effect (counter, labels: reason).
pub const FRAMES_DROPPED_TOTAL: &str = "frames_dropped_total";
/// Broadcast messages that could not be queued (counter).
pub const BROADCAST_DROPS_TOTAL: &str = "broadcast_drops_total";
/// Outbound writes abandoned at their deadline (counter).
pub const SEND_TIMEOUTS_TOTAL: &str = "send_timeouts_total";
/// Hubs in the registry (gauge).
pub const HUBS_ACTIVE: &str = "hubs_active";
/// Hubs removed by the reaper (counter).
pub const HUBS_REAPED_TOTAL: &str = "hubs_reaped_total";
