//! Connection lifecycle event handlers for place-link.
//!
//! Provides callback-based hooks for monitoring the realtime socket:
//!
//! - [`on_connect`](EventHandlers::on_connect): Fired when a socket session opens
//! - [`on_disconnect`](EventHandlers::on_disconnect): Fired when a session closes
//! - [`on_error`](EventHandlers::on_error): Fired on socket or protocol errors
//! - [`on_receive`](EventHandlers::on_receive): Optional debug hook for all incoming frames
//! - [`on_send`](EventHandlers::on_send): Optional debug hook for all outgoing frames
//! - [`on_fatal`](EventHandlers::on_fatal): Fired once when the client gives up
//!   waiting for credentials. This is where an application restarts itself.
//!
//! # Example
//!
//! ```rust,no_run
//! use place_link::{EventHandlers, PlaceLinkClient, StaticAuthProvider};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handlers = EventHandlers::new()
//!     .on_connect(|| println!("Connected to PlaceOS"))
//!     .on_disconnect(|reason| println!("Disconnected: {}", reason))
//!     .on_fatal(|attempts| {
//!         eprintln!("No credentials after {} attempts, restarting", attempts);
//!         std::process::exit(1);
//!     });
//!
//! let client = PlaceLinkClient::builder()
//!     .auth(StaticAuthProvider::new("placeos.local"))
//!     .event_handlers(handlers)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

/// Reason for a disconnect event.
#[derive(Debug, Clone)]
pub struct DisconnectReason {
    /// Human-readable description of why the connection closed.
    pub message: String,
    /// WebSocket close code, if available (e.g. 1000 = normal, 1006 = abnormal).
    pub code: Option<u16>,
}

impl DisconnectReason {
    /// Create a new disconnect reason with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Create a new disconnect reason with a message and close code.
    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "{} (code: {})", self.message, code)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// Error information passed to the `on_error` handler.
#[derive(Debug, Clone)]
pub struct ConnectionError {
    /// Human-readable error message.
    pub message: String,
    /// HTTP status of a failed upgrade, when known (401 triggers token
    /// invalidation).
    pub status: Option<u16>,
    /// Whether this error is recoverable (i.e. auto-reconnect may succeed).
    pub recoverable: bool,
}

impl ConnectionError {
    /// Create a new connection error.
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            status: None,
            recoverable,
        }
    }

    /// Attach the HTTP status of a failed upgrade.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status: {})", self.message, status),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Type alias for the on_connect callback.
pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Type alias for the on_disconnect callback.
pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;

/// Type alias for the on_error callback.
pub type OnErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;

/// Type alias for the on_receive callback (debug hook for all inbound frames).
pub type OnReceiveCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Type alias for the on_send callback (debug hook for all outbound frames).
pub type OnSendCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Type alias for the on_fatal callback. Receives the number of attempts made.
pub type OnFatalCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// Connection lifecycle event handlers.
///
/// All handlers are optional. Handlers are `Send + Sync` and are invoked
/// from the background connection task, so they should return quickly.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connect: Option<OnConnectCallback>,
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,
    pub(crate) on_error: Option<OnErrorCallback>,
    pub(crate) on_receive: Option<OnReceiveCallback>,
    pub(crate) on_send: Option<OnSendCallback>,
    pub(crate) on_fatal: Option<OnFatalCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .field("on_send", &self.on_send.is_some())
            .field("on_fatal", &self.on_fatal.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create a new empty `EventHandlers` (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked when a socket session opens.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when a socket session closes.
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when a socket error occurs.
    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked for every raw frame received from the server.
    ///
    /// Includes `"pong"` heartbeats.
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_receive = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked for every raw frame sent to the server.
    pub fn on_send(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_send = Some(Arc::new(f));
        self
    }

    /// Register the last-resort recovery action.
    ///
    /// Invoked once when credentials never became available within
    /// `max_auth_wait_attempts`. Without it the client only logs and every
    /// pending `connect()` fails with
    /// [`ConnectExhausted`](crate::PlaceLinkError::ConnectExhausted).
    pub fn on_fatal(mut self, f: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_fatal = Some(Arc::new(f));
        self
    }

    /// Returns `true` if any handler is registered.
    pub fn has_any(&self) -> bool {
        self.on_connect.is_some()
            || self.on_disconnect.is_some()
            || self.on_error.is_some()
            || self.on_receive.is_some()
            || self.on_send.is_some()
            || self.on_fatal.is_some()
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    pub(crate) fn emit_connect(&self) {
        if let Some(cb) = &self.on_connect {
            cb();
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(reason);
        }
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    pub(crate) fn emit_receive(&self, raw: &str) {
        if let Some(cb) = &self.on_receive {
            cb(raw);
        }
    }

    pub(crate) fn emit_send(&self, raw: &str) {
        if let Some(cb) = &self.on_send {
            cb(raw);
        }
    }

    /// Returns `true` when a fatal handler consumed the event.
    pub(crate) fn emit_fatal(&self, attempts: u32) -> bool {
        match &self.on_fatal {
            Some(cb) => {
                cb(attempts);
                true
            },
            None => false,
        }
    }
}
