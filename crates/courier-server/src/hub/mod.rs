//! Per-session broadcast hubs.
//!
//! A [`SessionHub`] owns the connections of one delivery session together
//! with the last known driver and customer locations. The [`HubRegistry`]
//! maps session IDs to hubs and reaps the ones nobody uses anymore.

pub mod registry;

pub use registry::{HubRegistry, spawn_reaper};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use courier_core::{ConnectionId, Location, LocationMessage, Role, SessionId, UpdateKind};
use metrics::counter;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::HubError;
use crate::metrics::BROADCAST_DROPS_TOTAL;
use crate::websocket::connection::ClientConnection;

/// Cumulative drops after which a connection is evicted.
pub const DEFAULT_MAX_DROPPED_MESSAGES: u64 = 100;

struct HubState {
    clients: HashMap<ConnectionId, Arc<ClientConnection>>,
    driver: Option<Location>,
    customer: Option<Location>,
    last_activity: Instant,
    completed: bool,
    retired: bool,
}

impl HubState {
    fn location(&self, kind: UpdateKind) -> Option<Location> {
        match kind {
            UpdateKind::DriverLoc => self.driver,
            UpdateKind::CustomerLoc => self.customer,
        }
    }

    fn set_location(&mut self, kind: UpdateKind, location: Location) {
        match kind {
            UpdateKind::DriverLoc => self.driver = Some(location),
            UpdateKind::CustomerLoc => self.customer = Some(location),
        }
        self.last_activity = Instant::now();
    }
}

/// Connections and cached locations for one session.
///
/// All state sits behind one `RwLock` that is never held across an await or
/// while a connection's queue is written to, except for the single replay
/// enqueue in [`register`](Self::register).
pub struct SessionHub {
    id: SessionId,
    state: RwLock<HubState>,
    max_dropped: u64,
}

impl SessionHub {
    /// Empty hub.
    pub fn new(id: SessionId) -> Self {
        Self::with_max_dropped(id, DEFAULT_MAX_DROPPED_MESSAGES)
    }

    /// Empty hub evicting connections after `max_dropped` cumulative drops.
    pub fn with_max_dropped(id: SessionId, max_dropped: u64) -> Self {
        Self {
            id,
            state: RwLock::new(HubState {
                clients: HashMap::new(),
                driver: None,
                customer: None,
                last_activity: Instant::now(),
                completed: false,
                retired: false,
            }),
            max_dropped: max_dropped.max(1),
        }
    }

    /// Session this hub serves.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Add a connection without replay.
    pub fn add_client(&self, connection: Arc<ClientConnection>) -> Result<(), HubError> {
        let mut state = self.state.write();
        if state.retired {
            return Err(HubError::Retired);
        }
        let _ = state.clients.insert(connection.id.clone(), connection);
        state.last_activity = Instant::now();
        Ok(())
    }

    /// Add a connection and queue the counterpart's cached location to it.
    ///
    /// Both happen under the write lock, so the replay is the first thing
    /// the connection receives from this hub. Returns the replayed message.
    pub fn register(
        &self,
        connection: Arc<ClientConnection>,
    ) -> Result<Option<LocationMessage>, HubError> {
        let mut state = self.state.write();
        if state.retired {
            return Err(HubError::Retired);
        }
        let replay = connection
            .role()
            .counterpart()
            .and_then(UpdateKind::for_role)
            .and_then(|kind| state.location(kind).map(|loc| LocationMessage::new(kind, loc)));
        if let Some(message) = &replay {
            let _ = connection.send_json(message);
        }
        let _ = state.clients.insert(connection.id.clone(), connection);
        state.last_activity = Instant::now();
        Ok(replay)
    }

    /// Remove a connection. Removing an absent one is a no-op.
    pub fn remove_client(&self, id: &ConnectionId) -> bool {
        let mut state = self.state.write();
        let removed = state.clients.remove(id).is_some();
        if removed {
            state.last_activity = Instant::now();
        }
        removed
    }

    /// Serialize `message` once and queue it to every connection matching
    /// `filter`.
    ///
    /// Matching connections are snapshotted under the read lock, which is
    /// released before any queue is touched. A connection whose cumulative
    /// drops reach the hub's limit is closed. Returns the number of
    /// connections the message was queued to.
    pub fn broadcast<T, F>(&self, message: &T, filter: F) -> usize
    where
        T: Serialize + ?Sized,
        F: Fn(&ClientConnection) -> bool,
    {
        let Some(json) = self.encode(message) else {
            return 0;
        };
        let targets = Self::snapshot(&self.state.read(), filter);
        self.fan_out(&json, targets)
    }

    fn encode<T: Serialize + ?Sized>(&self, message: &T) -> Option<Arc<String>> {
        match serde_json::to_string(message) {
            Ok(json) => Some(Arc::new(json)),
            Err(err) => {
                warn!(session_id = %self.id, error = %err, "broadcast serialization failed");
                None
            }
        }
    }

    fn snapshot<F>(state: &HubState, filter: F) -> Vec<Arc<ClientConnection>>
    where
        F: Fn(&ClientConnection) -> bool,
    {
        state
            .clients
            .values()
            .filter(|conn| filter(Arc::as_ref(conn)))
            .cloned()
            .collect()
    }

    fn fan_out(&self, json: &Arc<String>, targets: Vec<Arc<ClientConnection>>) -> usize {
        let mut delivered = 0;
        for conn in targets {
            if conn.send(Arc::clone(json)) {
                delivered += 1;
                continue;
            }
            counter!(BROADCAST_DROPS_TOTAL).increment(1);
            let drops = conn.drop_count();
            if drops >= self.max_dropped && !conn.is_closed() {
                warn!(
                    session_id = %self.id,
                    conn_id = %conn.id,
                    drops,
                    "evicting slow connection"
                );
                conn.close();
            } else {
                debug!(session_id = %self.id, conn_id = %conn.id, drops, "broadcast dropped");
            }
        }
        delivered
    }

    /// Queue `message` to every connection of `role`.
    pub fn broadcast_to_role<T: Serialize + ?Sized>(&self, message: &T, role: Role) -> usize {
        self.broadcast(message, |conn| conn.role() == role)
    }

    /// Replace the cached driver location.
    pub fn set_driver_location(&self, location: Location) {
        self.state.write().set_location(UpdateKind::DriverLoc, location);
    }

    /// Replace the cached customer location.
    pub fn set_customer_location(&self, location: Location) {
        self.state.write().set_location(UpdateKind::CustomerLoc, location);
    }

    /// Cached driver location, if any.
    pub fn driver_location(&self) -> Option<Location> {
        self.state.read().driver
    }

    /// Cached customer location, if any.
    pub fn customer_location(&self) -> Option<Location> {
        self.state.read().customer
    }

    /// Cached location for `kind`.
    pub fn location(&self, kind: UpdateKind) -> Option<Location> {
        self.state.read().location(kind)
    }

    /// Cache `location` as the latest `kind` update and broadcast it to the
    /// opposite role. Last write wins; timestamps are not compared.
    ///
    /// The cache write and the audience snapshot share one write-lock
    /// section, so a connection registering concurrently either gets the
    /// value as its replay or as this broadcast, never both.
    pub fn publish(&self, kind: UpdateKind, location: Location) -> Result<usize, HubError> {
        let json = self.encode(&LocationMessage::new(kind, location));
        let audience = kind.audience();
        let targets = {
            let mut state = self.state.write();
            if state.retired {
                return Err(HubError::Retired);
            }
            state.set_location(kind, location);
            Self::snapshot(&state, |conn| conn.role() == audience)
        };
        Ok(json.map_or(0, |json| self.fan_out(&json, targets)))
    }

    /// Number of registered connections.
    pub fn client_count(&self) -> usize {
        self.state.read().clients.len()
    }

    /// Flag the session's delivery as finished, making the hub reapable as
    /// soon as it has no connections.
    pub fn mark_completed(&self) {
        self.state.write().completed = true;
    }

    /// Whether the delivery has finished.
    pub fn is_completed(&self) -> bool {
        self.state.read().completed
    }

    /// Whether the hub has been reaped.
    pub fn is_retired(&self) -> bool {
        self.state.read().retired
    }

    /// Time since the last registration, removal or update.
    pub fn idle_for(&self) -> Duration {
        self.state.read().last_activity.elapsed()
    }

    /// Retire the hub if it has no connections and is completed or has been
    /// idle for at least `idle_ttl`. Retired hubs reject registration and
    /// publishing for good.
    pub(crate) fn try_retire(&self, idle_ttl: Duration) -> bool {
        let mut state = self.state.write();
        if state.retired {
            return true;
        }
        if !state.clients.is_empty() {
            return false;
        }
        if state.completed || state.last_activity.elapsed() >= idle_ttl {
            state.retired = true;
        }
        state.retired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::websocket::connection::Outbound;

    fn loc(lat: f64, lng: f64) -> Location {
        Location::new(lat, lng, Utc.timestamp_millis_opt(1_700_000_000_000).unwrap())
    }

    fn conn(role: Role, capacity: usize) -> (Arc<ClientConnection>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = ClientConnection::new(ConnectionId::new(), role, tx, CancellationToken::new());
        (Arc::new(conn), rx)
    }

    fn text(out: Outbound) -> serde_json::Value {
        match out {
            Outbound::Text(text) => serde_json::from_str(&text).unwrap(),
            Outbound::Ping => panic!("expected text"),
        }
    }

    fn hub() -> SessionHub {
        SessionHub::new(SessionId::from("s1"))
    }

    #[test]
    fn add_and_remove_clients() {
        let hub = hub();
        let (a, _ra) = conn(Role::Driver, 4);
        let (b, _rb) = conn(Role::Customer, 4);
        hub.add_client(a.clone()).unwrap();
        hub.add_client(b.clone()).unwrap();
        assert_eq!(hub.client_count(), 2);
        assert!(hub.remove_client(&a.id));
        assert!(!hub.remove_client(&a.id));
        assert_eq!(hub.client_count(), 1);
    }

    #[test]
    fn broadcast_on_empty_hub_is_noop() {
        let hub = hub();
        assert_eq!(hub.broadcast(&serde_json::json!({"x": 1}), |_| true), 0);
    }

    #[test]
    fn broadcast_respects_filter() {
        let hub = hub();
        let (driver, mut rd) = conn(Role::Driver, 4);
        let (customer, mut rc) = conn(Role::Customer, 4);
        let (kitchen, mut rk) = conn(Role::Kitchen, 4);
        for c in [&driver, &customer, &kitchen] {
            hub.add_client(Arc::clone(c)).unwrap();
        }

        let sent = hub.broadcast_to_role(&serde_json::json!({"hello": true}), Role::Customer);
        assert_eq!(sent, 1);
        assert_eq!(text(rc.try_recv().unwrap())["hello"], true);
        assert!(rd.try_recv().is_err());
        assert!(rk.try_recv().is_err());
    }

    #[test]
    fn removed_client_receives_nothing() {
        let hub = hub();
        let (customer, mut rc) = conn(Role::Customer, 4);
        hub.add_client(customer.clone()).unwrap();
        let _ = hub.remove_client(&customer.id);
        assert_eq!(hub.broadcast(&serde_json::json!({}), |_| true), 0);
        assert!(rc.try_recv().is_err());
        assert_eq!(customer.drop_count(), 0);
    }

    #[test]
    fn publish_caches_and_fans_out_to_audience() {
        let hub = hub();
        let (driver, mut rd) = conn(Role::Driver, 4);
        let (c1, mut r1) = conn(Role::Customer, 4);
        let (c2, mut r2) = conn(Role::Customer, 4);
        for c in [&driver, &c1, &c2] {
            hub.add_client(Arc::clone(c)).unwrap();
        }

        let sent = hub.publish(UpdateKind::DriverLoc, loc(37.1, -122.1)).unwrap();
        assert_eq!(sent, 2);
        assert_eq!(hub.driver_location(), Some(loc(37.1, -122.1)));
        assert_eq!(hub.customer_location(), None);

        for rx in [&mut r1, &mut r2] {
            let msg = text(rx.try_recv().unwrap());
            assert_eq!(msg["type"], "driver_loc");
            assert_eq!(msg["lat"], 37.1);
            assert_eq!(msg["lng"], -122.1);
        }
        assert!(rd.try_recv().is_err());
    }

    #[test]
    fn set_location_last_write_wins() {
        let hub = hub();
        let newer = Location::new(1.0, 1.0, Utc.timestamp_millis_opt(2_000).unwrap());
        let older = Location::new(2.0, 2.0, Utc.timestamp_millis_opt(1_000).unwrap());
        hub.set_customer_location(newer);
        hub.set_customer_location(older);
        assert_eq!(hub.customer_location(), Some(older));
        assert_eq!(hub.location(UpdateKind::CustomerLoc), Some(older));
    }

    #[test]
    fn register_replays_counterpart_location() {
        let hub = hub();
        hub.set_driver_location(loc(37.1, -122.1));
        hub.set_customer_location(loc(37.0, -122.0));

        let (customer, mut rc) = conn(Role::Customer, 4);
        let replay = hub.register(customer).unwrap();
        assert_eq!(replay.map(|m| m.kind), Some(UpdateKind::DriverLoc));
        let msg = text(rc.try_recv().unwrap());
        assert_eq!(msg["type"], "driver_loc");
        assert_eq!(msg["lat"], 37.1);
        assert!(rc.try_recv().is_err());

        let (driver, mut rd) = conn(Role::Driver, 4);
        let _ = hub.register(driver).unwrap();
        assert_eq!(text(rd.try_recv().unwrap())["type"], "customer_loc");
    }

    #[test]
    fn register_without_cache_replays_nothing() {
        let hub = hub();
        let (customer, mut rc) = conn(Role::Customer, 4);
        assert_eq!(hub.register(customer).unwrap(), None);
        assert!(rc.try_recv().is_err());
    }

    #[test]
    fn kitchen_gets_no_replay() {
        let hub = hub();
        hub.set_driver_location(loc(1.0, 1.0));
        hub.set_customer_location(loc(2.0, 2.0));
        let (kitchen, mut rk) = conn(Role::Kitchen, 4);
        assert_eq!(hub.register(kitchen).unwrap(), None);
        assert!(rk.try_recv().is_err());
    }

    #[test]
    fn replay_precedes_later_broadcast() {
        let hub = hub();
        hub.set_driver_location(loc(1.0, 1.0));
        let (customer, mut rc) = conn(Role::Customer, 4);
        let _ = hub.register(customer).unwrap();
        let _ = hub.publish(UpdateKind::DriverLoc, loc(2.0, 2.0)).unwrap();
        assert_eq!(text(rc.try_recv().unwrap())["lat"], 1.0);
        assert_eq!(text(rc.try_recv().unwrap())["lat"], 2.0);
    }

    #[test]
    fn slow_connection_evicted_after_limit() {
        let hub = SessionHub::with_max_dropped(SessionId::from("s1"), 2);
        let (slow, _rx) = conn(Role::Customer, 1);
        let (fast, mut rf) = conn(Role::Customer, 16);
        hub.add_client(slow.clone()).unwrap();
        hub.add_client(fast.clone()).unwrap();

        for i in 0..3 {
            let _ = hub.broadcast_to_role(&serde_json::json!({ "n": i }), Role::Customer);
        }
        assert!(slow.is_closed());
        assert_eq!(slow.drop_count(), 2);
        assert!(!fast.is_closed());
        for i in 0..3 {
            assert_eq!(text(rf.try_recv().unwrap())["n"], i);
        }
    }

    #[test]
    fn retire_requires_no_clients() {
        let hub = hub();
        let (driver, _rd) = conn(Role::Driver, 4);
        hub.add_client(driver.clone()).unwrap();
        assert!(!hub.try_retire(Duration::ZERO));
        let _ = hub.remove_client(&driver.id);
        assert!(hub.try_retire(Duration::ZERO));
        assert!(hub.is_retired());
    }

    #[test]
    fn completed_hub_retires_regardless_of_age() {
        let hub = hub();
        assert!(!hub.try_retire(Duration::from_secs(3600)));
        hub.mark_completed();
        assert!(hub.is_completed());
        assert!(hub.try_retire(Duration::from_secs(3600)));
    }

    #[test]
    fn retired_hub_rejects_membership_and_updates() {
        let hub = hub();
        assert!(hub.try_retire(Duration::ZERO));
        let (driver, _rd) = conn(Role::Driver, 4);
        assert_matches!(hub.add_client(driver.clone()), Err(HubError::Retired));
        assert_matches!(hub.register(driver), Err(HubError::Retired));
        assert_matches!(hub.publish(UpdateKind::DriverLoc, loc(1.0, 1.0)), Err(HubError::Retired));
        assert_eq!(hub.driver_location(), None);
    }

    #[test]
    fn concurrent_join_never_sees_an_update_twice() {
        const UPDATES: u32 = 300;
        let hub = Arc::new(hub());
        let joined: Vec<_> = std::thread::scope(|scope| {
            let publisher = scope.spawn(|| {
                for i in 1..=UPDATES {
                    hub.publish(UpdateKind::DriverLoc, loc(f64::from(i) / 10.0, 0.0)).unwrap();
                }
            });
            let mut joined = Vec::new();
            while !publisher.is_finished() {
                let (customer, rx) = conn(Role::Customer, 2 * UPDATES as usize);
                let _ = hub.register(customer).unwrap();
                joined.push(rx);
                std::thread::yield_now();
            }
            publisher.join().unwrap();
            joined
        });

        assert!(!joined.is_empty());
        for mut rx in joined {
            let mut last = f64::NEG_INFINITY;
            while let Ok(out) = rx.try_recv() {
                let lat = text(out)["lat"].as_f64().unwrap();
                assert!(lat > last, "update {lat} delivered twice or out of order");
                last = lat;
            }
        }
    }
}
