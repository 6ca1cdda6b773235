use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection-level options for the realtime socket.
///
/// These options control reconnection and the initial wait for
/// credentials:
/// - Automatic reconnection on connection loss
/// - Linear reconnect backoff and its cap
/// - How long to wait for the auth provider before giving up for good
///
/// Timing of requests, heartbeats and health checks lives in
/// [`PlaceLinkTimeouts`](crate::PlaceLinkTimeouts).
///
/// # Example
///
/// ```rust
/// use place_link::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .with_auto_reconnect(true)
///     .with_reconnect_delay_ms(500)
///     .with_max_auth_wait_attempts(10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Reconnect automatically after the socket errors or closes.
    /// Default: true
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Reconnect delay step in milliseconds.
    /// The delay before reconnect is `reconnect_delay_ms * (attempts + 1)`,
    /// capped by `max_reconnect_delay_ms`.
    /// Default: 300ms
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Maximum delay between reconnection attempts.
    /// Default: 5000ms
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Delay step while waiting for an authority and token.
    /// Default: 1000ms
    #[serde(default = "default_auth_wait_step_ms")]
    pub auth_wait_step_ms: u64,

    /// The credential wait delay grows with the attempt number up to this
    /// many steps.
    /// Default: 10
    #[serde(default = "default_max_auth_wait_steps")]
    pub max_auth_wait_steps: u32,

    /// Attempts at obtaining credentials before the connect is declared
    /// fatal and `on_fatal` fires.
    /// Default: 40
    #[serde(default = "default_max_auth_wait_attempts")]
    pub max_auth_wait_attempts: u32,

    /// Capacity of the debug event broadcast channel.
    /// Default: 256
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    300
}

fn default_max_reconnect_delay_ms() -> u64 {
    5000
}

fn default_auth_wait_step_ms() -> u64 {
    1000
}

fn default_max_auth_wait_steps() -> u32 {
    10
}

fn default_max_auth_wait_attempts() -> u32 {
    40
}

fn default_event_channel_capacity() -> usize {
    256
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: default_auto_reconnect(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            auth_wait_step_ms: default_auth_wait_step_ms(),
            max_auth_wait_steps: default_max_auth_wait_steps(),
            max_auth_wait_attempts: default_max_auth_wait_attempts(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl ConnectionOptions {
    /// Create new connection options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to automatically reconnect on connection loss
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the reconnect delay step (in milliseconds)
    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }

    /// Set the maximum delay between reconnection attempts (in milliseconds)
    pub fn with_max_reconnect_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_reconnect_delay_ms = max_delay_ms;
        self
    }

    /// Set the delay step used while waiting for credentials
    pub fn with_auth_wait_step_ms(mut self, step_ms: u64) -> Self {
        self.auth_wait_step_ms = step_ms;
        self
    }

    /// Set how many steps the credential wait delay may grow to
    pub fn with_max_auth_wait_steps(mut self, steps: u32) -> Self {
        self.max_auth_wait_steps = steps;
        self
    }

    /// Set the credential wait attempts after which the connect is fatal
    pub fn with_max_auth_wait_attempts(mut self, attempts: u32) -> Self {
        self.max_auth_wait_attempts = attempts;
        self
    }

    /// Set the debug event channel capacity
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Delay before the next reconnect after `attempts` consecutive failed
    /// sessions. Non-decreasing in `attempts`, capped at
    /// `max_reconnect_delay_ms`.
    pub fn reconnect_delay(&self, attempts: u32) -> Duration {
        let step = self
            .reconnect_delay_ms
            .saturating_mul(u64::from(attempts).saturating_add(1));
        Duration::from_millis(step.min(self.max_reconnect_delay_ms))
    }

    /// Delay before credential wait attempt number `attempt` (1-based).
    pub fn auth_wait_delay(&self, attempt: u32) -> Duration {
        let steps = attempt.min(self.max_auth_wait_steps);
        Duration::from_millis(self.auth_wait_step_ms.saturating_mul(u64::from(steps)))
    }
}
