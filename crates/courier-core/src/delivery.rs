//! Delivery records.
//!
//! The relay itself only writes a record once, when a session is created;
//! afterwards the record is read for delivery details and advanced through
//! [`DeliveryStatus`] by the driver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;
use crate::location::Location;

/// Progress of a delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Session created, driver not yet at the pickup.
    Created,
    /// Order collected by the driver.
    PickedUp,
    /// Order handed to the customer. Terminal.
    Delivered,
}

impl DeliveryStatus {
    /// Whether moving from `self` to `next` is a forward step.
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::PickedUp | Self::Delivered) | (Self::PickedUp, Self::Delivered)
        )
    }

    /// Whether the delivery has finished.
    pub fn is_terminal(self) -> bool {
        self == Self::Delivered
    }
}

/// A tracked delivery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    /// Session ID, doubling as the record key.
    pub id: SessionId,
    /// Caller-supplied order reference.
    pub order_id: String,
    /// Current status.
    pub status: DeliveryStatus,
    /// Customer location at session creation.
    pub customer: Location,
    /// Free-form customer address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_address: Option<String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    /// A fresh record in [`DeliveryStatus::Created`].
    pub fn new(id: SessionId, order_id: impl Into<String>, customer: Location) -> Self {
        let now = Utc::now();
        Self {
            id,
            order_id: order_id.into(),
            status: DeliveryStatus::Created,
            customer,
            customer_address: None,
            notes: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_only() {
        use DeliveryStatus::{Created, Delivered, PickedUp};
        assert!(Created.can_transition_to(PickedUp));
        assert!(Created.can_transition_to(Delivered));
        assert!(PickedUp.can_transition_to(Delivered));
        assert!(!PickedUp.can_transition_to(Created));
        assert!(!Delivered.can_transition_to(PickedUp));
        assert!(!Created.can_transition_to(Created));
        assert!(Delivered.is_terminal());
        assert!(!PickedUp.is_terminal());
    }

    #[test]
    fn new_record_defaults() {
        let d = Delivery::new(SessionId::from("abc"), "ORD-1", Location::new(37.0, -122.0, Utc::now()));
        assert_eq!(d.status, DeliveryStatus::Created);
        assert_eq!(d.created_at, d.updated_at);
        assert!(d.tags.is_empty());
    }

    #[test]
    fn serializes_snake_case_and_skips_empty() {
        let d = Delivery::new(SessionId::from("abc"), "ORD-1", Location::new(37.0, -122.0, Utc::now()));
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["id"], "abc");
        assert_eq!(v["order_id"], "ORD-1");
        assert_eq!(v["status"], "created");
        assert_eq!(v["customer"]["lat"], 37.0);
        assert!(v.get("tags").is_none());
        assert!(v.get("notes").is_none());
        assert!(v.get("assigned_driver").is_none());
    }
}
