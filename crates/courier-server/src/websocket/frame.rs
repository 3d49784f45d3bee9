//! Inbound frame decoding.

use courier_core::protocol::InboundFrame;
use courier_core::{Location, Role, UpdateKind};

/// Why an inbound frame was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Not JSON, or missing required fields.
    Malformed,
    /// `type` names no known update.
    UnknownType,
    /// The update belongs to the other role.
    RoleMismatch,
    /// Coordinates out of range or NaN.
    InvalidLocation,
}

impl DropReason {
    /// Metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::UnknownType => "unknown_type",
            Self::RoleMismatch => "role_mismatch",
            Self::InvalidLocation => "invalid_location",
        }
    }
}

/// Decode a text frame sent by a connection authenticated as `role`.
///
/// Only an update of the sender's own kind with a valid location passes.
pub fn decode_update(text: &str, role: Role) -> Result<(UpdateKind, Location), DropReason> {
    let frame: InboundFrame = serde_json::from_str(text).map_err(|_| DropReason::Malformed)?;
    let kind = UpdateKind::parse(&frame.kind).ok_or(DropReason::UnknownType)?;
    if kind.owner() != role {
        return Err(DropReason::RoleMismatch);
    }
    let location = frame.update.into_location();
    if !location.validate() {
        return Err(DropReason::InvalidLocation);
    }
    Ok((kind, location))
}
