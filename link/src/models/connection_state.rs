use serde::{Deserialize, Serialize};

/// Read-only snapshot of the transport's connection state.
///
/// Returned by [`PlaceLinkClient::connection_state()`](crate::PlaceLinkClient::connection_state).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    /// Whether a socket session is currently open
    pub connected: bool,
    /// Consecutive connection attempts since the last healthy session
    pub connection_attempts: u32,
    /// Incremented every time a socket session opens
    pub connection_id: u64,
    /// Millis since Unix epoch of the last `"pong"`, if any
    pub last_pong_at_ms: Option<u64>,
    /// Millis since Unix epoch at which the current session opened
    pub connected_at_ms: Option<u64>,
}

/// Published on the sync stream whenever a session ends: which session it
/// was and for how long it stayed up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSync {
    pub connection_id: u64,
    pub alive_ms: u64,
}
