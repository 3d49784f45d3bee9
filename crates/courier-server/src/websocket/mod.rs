//! Live connections: handles, keepalive, frame decoding and the
//! per-connection session loop.

pub mod connection;
pub mod frame;
pub mod keepalive;
pub mod session;
