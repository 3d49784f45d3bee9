//! # courier-server
//!
//! Axum HTTP + `WebSocket` relay for live delivery tracking.
//!
//! - Session hubs: one per delivery, holding live connections and the last
//!   driver and customer location
//! - `WebSocket` gateway: authenticated upgrade, bounded per-connection send
//!   queue, keepalive pings, send deadlines
//! - REST fallback: post and read locations without a live connection
//! - Delivery routes: create a session and its credentials, read it, advance
//!   its status
//! - Hub reaping once sessions are finished or idle
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod store;
pub mod websocket;

pub use config::{ServerConfig, SessionConfig};
pub use errors::{ApiError, HubError};
pub use hub::{HubRegistry, SessionHub};
pub use server::{AppState, CourierServer, ServerHandle};
pub use shutdown::ShutdownCoordinator;
pub use store::{DeliveryStore, InMemoryDeliveryStore, StoreError};
