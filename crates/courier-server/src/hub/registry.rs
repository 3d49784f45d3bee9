//! Session ID to hub mapping.

use std::sync::Arc;
use std::time::Duration;

use courier_core::{Location, LocationMessage, SessionId, UpdateKind};
use dashmap::DashMap;
use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{DEFAULT_MAX_DROPPED_MESSAGES, SessionHub};
use crate::errors::HubError;
use crate::metrics::{HUBS_ACTIVE, HUBS_REAPED_TOTAL};
use crate::websocket::connection::ClientConnection;

/// Lazily populated map of live hubs.
///
/// Hubs are created on first reference and removed only by
/// [`reap`](Self::reap). A hub is never touched while a map shard lock is
/// held, except inside `reap`, which always takes the shard lock first.
pub struct HubRegistry {
    hubs: DashMap<SessionId, Arc<SessionHub>>,
    max_dropped: u64,
}

impl HubRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::with_max_dropped(DEFAULT_MAX_DROPPED_MESSAGES)
    }

    /// Empty registry whose hubs evict connections after `max_dropped`
    /// cumulative drops.
    pub fn with_max_dropped(max_dropped: u64) -> Self {
        Self {
            hubs: DashMap::new(),
            max_dropped,
        }
    }

    /// Hub for `id`, creating it if absent. Concurrent callers for the same
    /// unseen ID all get the same instance.
    pub fn get_or_create(&self, id: &SessionId) -> Arc<SessionHub> {
        if let Some(hub) = self.hubs.get(id.as_str()) {
            return Arc::clone(hub.value());
        }
        let hub = self.hubs.entry(id.clone()).or_insert_with(|| {
            gauge!(HUBS_ACTIVE).increment(1.0);
            debug!(session_id = %id, "hub created");
            Arc::new(SessionHub::with_max_dropped(id.clone(), self.max_dropped))
        });
        Arc::clone(hub.value())
    }

    /// Hub for `id` if one exists.
    pub fn get(&self, id: &str) -> Option<Arc<SessionHub>> {
        self.hubs.get(id).map(|hub| Arc::clone(hub.value()))
    }

    /// Register `connection` on the session's hub with replay, retrying on a
    /// fresh hub if the current one was just reaped.
    pub fn join(
        &self,
        id: &SessionId,
        connection: &Arc<ClientConnection>,
    ) -> (Arc<SessionHub>, Option<LocationMessage>) {
        loop {
            let hub = self.get_or_create(id);
            match hub.register(Arc::clone(connection)) {
                Ok(replay) => return (hub, replay),
                Err(HubError::Retired) => debug!(session_id = %id, "hub retired during join"),
            }
        }
    }

    /// Cache and broadcast an update on the session's hub, retrying on a
    /// fresh hub if the current one was just reaped. Returns the number of
    /// connections the update was queued to.
    pub fn publish(&self, id: &SessionId, kind: UpdateKind, location: Location) -> usize {
        loop {
            match self.get_or_create(id).publish(kind, location) {
                Ok(sent) => return sent,
                Err(HubError::Retired) => debug!(session_id = %id, "hub retired during publish"),
            }
        }
    }

    /// Cached location of `kind` for `id`. Does not create a hub.
    pub fn location(&self, id: &str, kind: UpdateKind) -> Option<Location> {
        self.get(id).and_then(|hub| hub.location(kind))
    }

    /// Remove every hub with no connections that is completed or has been
    /// idle for at least `idle_ttl`. Returns how many were removed.
    #[allow(clippy::cast_precision_loss)]
    pub fn reap(&self, idle_ttl: Duration) -> usize {
        let mut reaped = 0usize;
        self.hubs.retain(|_, hub| {
            let retired = hub.try_retire(idle_ttl);
            if retired {
                reaped += 1;
            }
            !retired
        });
        if reaped > 0 {
            counter!(HUBS_REAPED_TOTAL).increment(reaped as u64);
            gauge!(HUBS_ACTIVE).decrement(reaped as f64);
            info!(reaped, remaining = self.hubs.len(), "reaped idle hubs");
        }
        reaped
    }

    /// Number of hubs.
    pub fn len(&self) -> usize {
        self.hubs.len()
    }

    /// Whether there are no hubs.
    pub fn is_empty(&self) -> bool {
        self.hubs.is_empty()
    }

    /// Live connections across all hubs.
    pub fn connection_count(&self) -> usize {
        self.hubs.iter().map(|entry| entry.value().client_count()).sum()
    }
}

impl Default for HubRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Run [`HubRegistry::reap`] every `interval` until `cancel` fires.
pub fn spawn_reaper(
    registry: Arc<HubRegistry>,
    interval: Duration,
    idle_ttl: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let _ = ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = registry.reap(idle_ttl);
                }
                () = cancel.cancelled() => {
                    debug!("hub reaper stopped");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_core::{ConnectionId, Role};
    use tokio::sync::mpsc;

    use crate::websocket::connection::Outbound;

    fn conn(role: Role) -> (Arc<ClientConnection>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(8);
        let conn = ClientConnection::new(ConnectionId::new(), role, tx, CancellationToken::new());
        (Arc::new(conn), rx)
    }

    fn loc(lat: f64) -> Location {
        Location::new(lat, 0.0, Utc::now())
    }

    #[test]
    fn get_or_create_reuses_hub() {
        let registry = HubRegistry::new();
        let id = SessionId::from("s1");
        let a = registry.get_or_create(&id);
        let b = registry.get_or_create(&id);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_does_not_create() {
        let registry = HubRegistry::new();
        assert!(registry.get("nope").is_none());
        assert!(registry.location("nope", UpdateKind::DriverLoc).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_get_or_create_converges() {
        let registry = Arc::new(HubRegistry::new());
        let id = SessionId::from("race");
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                tokio::spawn(async move { registry.get_or_create(&id) })
            })
            .collect();
        let hubs: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert!(hubs.iter().all(|h| Arc::ptr_eq(h, &hubs[0])));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registries_are_independent() {
        let a = HubRegistry::new();
        let b = HubRegistry::new();
        let _ = a.get_or_create(&SessionId::from("s1"));
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }

    #[test]
    fn publish_then_read_location() {
        let registry = HubRegistry::new();
        let id = SessionId::from("s1");
        assert_eq!(registry.publish(&id, UpdateKind::CustomerLoc, loc(10.0)), 0);
        assert_eq!(
            registry.location("s1", UpdateKind::CustomerLoc).map(|l| l.lat()),
            Some(10.0)
        );
        assert!(registry.location("s1", UpdateKind::DriverLoc).is_none());
    }

    #[test]
    fn join_registers_and_replays() {
        let registry = HubRegistry::new();
        let id = SessionId::from("s1");
        let _ = registry.publish(&id, UpdateKind::DriverLoc, loc(5.0));
        let (customer, mut rx) = conn(Role::Customer);
        let (hub, replay) = registry.join(&id, &customer);
        assert_eq!(hub.client_count(), 1);
        assert_eq!(replay.map(|m| m.kind), Some(UpdateKind::DriverLoc));
        assert!(matches!(rx.try_recv(), Ok(Outbound::Text(_))));
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn reap_removes_only_idle_empty_hubs() {
        let registry = HubRegistry::new();
        let busy = SessionId::from("busy");
        let idle = SessionId::from("idle");
        let (driver, _rx) = conn(Role::Driver);
        let _ = registry.join(&busy, &driver);
        let _ = registry.get_or_create(&idle);

        assert_eq!(registry.reap(Duration::ZERO), 1);
        assert!(registry.get("busy").is_some());
        assert!(registry.get("idle").is_none());
    }

    #[test]
    fn reap_keeps_recent_hubs() {
        let registry = HubRegistry::new();
        let _ = registry.get_or_create(&SessionId::from("fresh"));
        assert_eq!(registry.reap(Duration::from_secs(3600)), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reap_removes_completed_hubs_early() {
        let registry = HubRegistry::new();
        let hub = registry.get_or_create(&SessionId::from("done"));
        hub.mark_completed();
        assert_eq!(registry.reap(Duration::from_secs(3600)), 1);
        assert!(hub.is_retired());
    }

    #[test]
    fn publish_after_reap_uses_fresh_hub() {
        let registry = HubRegistry::new();
        let id = SessionId::from("s1");
        let old = registry.get_or_create(&id);
        let _ = registry.reap(Duration::ZERO);

        let _ = registry.publish(&id, UpdateKind::DriverLoc, loc(1.0));
        let fresh = registry.get("s1").unwrap();
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert!(fresh.driver_location().is_some());
        assert!(old.driver_location().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_runs_until_cancelled() {
        let registry = Arc::new(HubRegistry::new());
        let _ = registry.get_or_create(&SessionId::from("s1"));
        let cancel = CancellationToken::new();
        let handle = spawn_reaper(
            Arc::clone(&registry),
            Duration::from_secs(1),
            Duration::ZERO,
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(registry.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
