//! Live-channel message envelope.
//!
//! Both directions carry a JSON object with a `type` discriminant and the
//! location fields inlined at the top level:
//!
//! ```json
//! {"type":"driver_loc","lat":37.1,"lng":-122.1,"speed":0.0,"at":"2023-11-14T22:13:20Z"}
//! ```

use serde::{Deserialize, Serialize};

use crate::location::{Location, LocationUpdate};
use crate::role::Role;

/// Which party a location update belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// A driver position.
    DriverLoc,
    /// A customer position.
    CustomerLoc,
}

impl UpdateKind {
    /// The update kind a role is allowed to publish.
    pub fn for_role(role: Role) -> Option<Self> {
        match role {
            Role::Driver => Some(Self::DriverLoc),
            Role::Customer => Some(Self::CustomerLoc),
            Role::Kitchen => None,
        }
    }

    /// Parse a wire discriminant. Unknown names return `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "driver_loc" => Some(Self::DriverLoc),
            "customer_loc" => Some(Self::CustomerLoc),
            _ => None,
        }
    }

    /// Wire discriminant.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DriverLoc => "driver_loc",
            Self::CustomerLoc => "customer_loc",
        }
    }

    /// The role that owns (publishes) this kind.
    pub fn owner(self) -> Role {
        match self {
            Self::DriverLoc => Role::Driver,
            Self::CustomerLoc => Role::Customer,
        }
    }

    /// The role that receives this kind.
    pub fn audience(self) -> Role {
        match self {
            Self::DriverLoc => Role::Customer,
            Self::CustomerLoc => Role::Driver,
        }
    }
}

/// Outbound envelope: broadcasts, replays and REST reads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationMessage {
    /// Discriminant.
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    /// Inlined location fields.
    #[serde(flatten)]
    pub location: Location,
}

impl LocationMessage {
    /// Wrap a location.
    pub fn new(kind: UpdateKind, location: Location) -> Self {
        Self { kind, location }
    }
}

/// Inbound frame as sent by clients on the live channel.
#[derive(Clone, Debug, Deserialize)]
pub struct InboundFrame {
    /// Discriminant as sent; may name an unknown kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Position fields.
    #[serde(flatten)]
    pub update: LocationUpdate,
}
