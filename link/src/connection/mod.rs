//! Realtime socket management.
//!
//! This module contains:
//! - [`websocket`]: Connect target resolution (route, cookie or query
//!   credentials), the [`SocketConnector`] seam and the tungstenite connector
//! - [`shared`]: The single shared socket session with heartbeat, health
//!   check, inbound routing and auto-reconnect

pub mod shared;
pub mod websocket;

pub use shared::{ConnectPhase, Transport};
pub use websocket::{
    websocket_route, ConnectTarget, SocketConnector, SocketEvent, SocketSession,
    TungsteniteConnector,
};

/// A duration far enough in the future (~100 years) to act as "never" for
/// deadline calculations without overflowing `Instant::now() + dur`.
pub(crate) const FAR_FUTURE: std::time::Duration =
    std::time::Duration::from_secs(100 * 365 * 24 * 3600);
