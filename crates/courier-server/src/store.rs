//! Delivery record storage.
//!
//! The relay only needs create, get and status transitions keyed by session
//! ID. Records live in process memory; nothing here survives a restart.

use std::collections::HashMap;

use chrono::Utc;
use courier_core::{Delivery, DeliveryStatus, SessionId};
use parking_lot::RwLock;

/// Storage failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No record for this ID.
    #[error("delivery not found: {0}")]
    NotFound(SessionId),
    /// The record's current status does not allow the requested step.
    #[error("cannot move from {from:?} to {to:?}")]
    Conflict {
        /// Status at the time of the request.
        from: DeliveryStatus,
        /// Requested status.
        to: DeliveryStatus,
    },
}

/// Key-value store of delivery records.
pub trait DeliveryStore: Send + Sync {
    /// Insert a record, replacing any existing one with the same ID.
    fn create(&self, delivery: Delivery);

    /// Fetch a record by ID.
    fn get(&self, id: &str) -> Option<Delivery>;

    /// Move a record to `next` if that is a forward step from its current
    /// status. The check and the write are atomic. Returns the updated record.
    fn transition(&self, id: &str, next: DeliveryStatus) -> Result<Delivery, StoreError>;
}

/// `HashMap`-backed store.
#[derive(Default)]
pub struct InMemoryDeliveryStore {
    records: RwLock<HashMap<SessionId, Delivery>>,
}

impl InMemoryDeliveryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl DeliveryStore for InMemoryDeliveryStore {
    fn create(&self, delivery: Delivery) {
        let _ = self.records.write().insert(delivery.id.clone(), delivery);
    }

    fn get(&self, id: &str) -> Option<Delivery> {
        self.records.read().get(id).cloned()
    }

    fn transition(&self, id: &str, next: DeliveryStatus) -> Result<Delivery, StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(SessionId::from(id)))?;
        if !record.status.can_transition_to(next) {
            return Err(StoreError::Conflict {
                from: record.status,
                to: next,
            });
        }
        record.status = next;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}
