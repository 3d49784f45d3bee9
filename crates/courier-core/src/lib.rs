//! # courier-core
//!
//! Foundation types shared by every courier crate:
//!
//! - [`Location`] and [`LocationUpdate`]: the validated coordinate value and its inbound form
//! - [`Role`]: the capability a credential grants on a session
//! - [`UpdateKind`] / [`LocationMessage`]: the JSON envelope used on the live channel
//! - [`SessionId`] / [`ConnectionId`]: branded identifiers
//! - [`Delivery`]: the record kept by the delivery store
//! - [`logging::init_subscriber`]: tracing setup for binaries and tests

#![deny(unsafe_code)]

pub mod delivery;
pub mod ids;
pub mod location;
pub mod logging;
pub mod protocol;
pub mod role;

pub use delivery::{Delivery, DeliveryStatus};
pub use ids::{ConnectionId, SessionId};
pub use location::{Location, LocationUpdate, timestamp_or_now};
pub use protocol::{LocationMessage, UpdateKind};
pub use role::Role;
