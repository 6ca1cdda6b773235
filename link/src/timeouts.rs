//! Timeout configuration for place-link.
//!
//! Centralizes every timer the realtime core runs: socket open, heartbeat,
//! health check, request expiry, send polling, rebinding and the request
//! deduplication window.

use std::time::Duration;

/// Timeout configuration for the realtime client.
///
/// # Examples
///
/// ```rust
/// use place_link::PlaceLinkTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = PlaceLinkTimeouts::default();
///
/// // Custom timeouts for high-latency sites
/// let timeouts = PlaceLinkTimeouts::builder()
///     .connection_timeout(Duration::from_secs(30))
///     .request_timeout(Duration::from_secs(20))
///     .build();
///
/// // Short timers for tests against the mock backend
/// let timeouts = PlaceLinkTimeouts::fast();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceLinkTimeouts {
    /// Timeout for opening the socket (TCP + TLS + upgrade).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// Interval between `"ping"` heartbeats.
    /// No inbound traffic for 4x this interval forces a reconnect.
    /// Set to 0 to disable heartbeats.
    /// Default: 15 seconds
    pub keepalive_interval: Duration,

    /// A freshly opened session that receives nothing within this window is
    /// considered unhealthy and reconnected.
    /// Set to 0 to disable.
    /// Default: 30 seconds
    pub health_check_timeout: Duration,

    /// Default timeout for `exec` requests.
    /// Default: 10 seconds
    pub request_timeout: Duration,

    /// Polling interval while a request waits for the socket to open.
    /// Default: 1 second
    pub send_retry_interval: Duration,

    /// Delay before stale bindings are re-bound after a reconnect.
    /// Default: 100 milliseconds
    pub rebind_delay: Duration,

    /// Identical requests issued within the same window share one in-flight
    /// request. Set to 0 to merge only on exact in-flight identity.
    /// Default: 60 seconds
    pub dedup_window: Duration,
}

impl Default for PlaceLinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(15),
            health_check_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            send_retry_interval: Duration::from_secs(1),
            rebind_delay: Duration::from_millis(100),
            dedup_window: Duration::from_secs(60),
        }
    }
}

impl PlaceLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> PlaceLinkTimeoutsBuilder {
        PlaceLinkTimeoutsBuilder::new()
    }

    /// Short timers for local development and tests.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            keepalive_interval: Duration::from_secs(5),
            health_check_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(2),
            send_retry_interval: Duration::from_millis(50),
            rebind_delay: Duration::from_millis(10),
            dedup_window: Duration::from_secs(60),
        }
    }

    /// Longer timers for high-latency or unreliable networks.
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(30),
            health_check_timeout: Duration::from_secs(90),
            request_timeout: Duration::from_secs(30),
            send_retry_interval: Duration::from_secs(2),
            rebind_delay: Duration::from_millis(250),
            dedup_window: Duration::from_secs(60),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365) // > 1 year
    }

    /// Window of inbound silence after which a session is torn down.
    pub fn silence_limit(&self) -> Duration {
        self.keepalive_interval.saturating_mul(4)
    }
}

/// Builder for creating custom [`PlaceLinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct PlaceLinkTimeoutsBuilder {
    timeouts: PlaceLinkTimeouts,
}

impl PlaceLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: PlaceLinkTimeouts::default(),
        }
    }

    /// Set the socket open timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the socket open timeout in seconds.
    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    /// Set the heartbeat interval. Set to 0 to disable.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.timeouts.keepalive_interval = interval;
        self
    }

    /// Set the heartbeat interval in seconds.
    pub fn keepalive_interval_secs(self, secs: u64) -> Self {
        self.keepalive_interval(Duration::from_secs(secs))
    }

    /// Set the initial health check window. Set to 0 to disable.
    pub fn health_check_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.health_check_timeout = timeout;
        self
    }

    /// Set the default `exec` timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.request_timeout = timeout;
        self
    }

    /// Set the default `exec` timeout in seconds.
    pub fn request_timeout_secs(self, secs: u64) -> Self {
        self.request_timeout(Duration::from_secs(secs))
    }

    /// Set the send polling interval used while disconnected.
    pub fn send_retry_interval(mut self, interval: Duration) -> Self {
        self.timeouts.send_retry_interval = interval;
        self
    }

    /// Set the delay before stale bindings are re-bound.
    pub fn rebind_delay(mut self, delay: Duration) -> Self {
        self.timeouts.rebind_delay = delay;
        self
    }

    /// Set the request deduplication window.
    pub fn dedup_window(mut self, window: Duration) -> Self {
        self.timeouts.dedup_window = window;
        self
    }

    /// Build the timeout configuration.
    pub fn build(self) -> PlaceLinkTimeouts {
        self.timeouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = PlaceLinkTimeouts::default();
        assert_eq!(timeouts.keepalive_interval, Duration::from_secs(15));
        assert_eq!(timeouts.health_check_timeout, Duration::from_secs(30));
        assert_eq!(timeouts.request_timeout, Duration::from_secs(10));
        assert_eq!(timeouts.dedup_window, Duration::from_secs(60));
        assert_eq!(timeouts.silence_limit(), Duration::from_secs(60));
    }

    #[test]
    fn test_builder() {
        let timeouts = PlaceLinkTimeouts::builder()
            .connection_timeout_secs(60)
            .request_timeout_secs(20)
            .rebind_delay(Duration::from_millis(5))
            .build();

        assert_eq!(timeouts.connection_timeout, Duration::from_secs(60));
        assert_eq!(timeouts.request_timeout, Duration::from_secs(20));
        assert_eq!(timeouts.rebind_delay, Duration::from_millis(5));
        assert_eq!(timeouts.keepalive_interval, Duration::from_secs(15));
    }

    #[test]
    fn test_fast_preset() {
        let timeouts = PlaceLinkTimeouts::fast();
        assert!(timeouts.request_timeout <= Duration::from_secs(5));
        assert!(timeouts.send_retry_interval < Duration::from_secs(1));
    }

    #[test]
    fn test_relaxed_preset() {
        let timeouts = PlaceLinkTimeouts::relaxed();
        assert!(timeouts.connection_timeout >= Duration::from_secs(30));
        assert!(timeouts.health_check_timeout >= Duration::from_secs(60));
    }

    #[test]
    fn test_is_no_timeout() {
        assert!(PlaceLinkTimeouts::is_no_timeout(Duration::ZERO));
        assert!(!PlaceLinkTimeouts::is_no_timeout(Duration::from_secs(1)));
        assert!(!PlaceLinkTimeouts::is_no_timeout(Duration::from_secs(3600)));
    }
}
