//! Session roles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The capability a credential grants on one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sends `driver_loc`, receives `customer_loc`.
    Driver,
    /// Sends `customer_loc`, receives `driver_loc`.
    Customer,
    /// Reserved. Neither sends nor receives location traffic.
    Kitchen,
}

impl Role {
    /// The party on the other side of the session, if this role takes part in
    /// location fan-out at all.
    pub fn counterpart(self) -> Option<Role> {
        match self {
            Role::Driver => Some(Role::Customer),
            Role::Customer => Some(Role::Driver),
            Role::Kitchen => None,
        }
    }

    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Driver => "driver",
            Role::Customer => "customer",
            Role::Kitchen => "kitchen",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
