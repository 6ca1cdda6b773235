//! Error types for place-link.
//!
//! Transport failures (socket errors, 401s, closes) are handled inside the
//! connection task and only surface through the status stream and
//! [`EventHandlers`](crate::EventHandlers). The variants below are what a
//! caller holding a request future can observe.

use crate::models::ErrorCode;
use thiserror::Error;

/// Result type for place-link operations.
pub type Result<T> = std::result::Result<T, PlaceLinkError>;

/// Errors returned by the realtime client.
///
/// `Clone` because a deduplicated request hands the same outcome to every
/// caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaceLinkError {
    /// Socket-level failure while opening or writing to the connection.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// The connection dropped while the request was in flight.
    #[error("Connection lost before a response was received")]
    ConnectionLost,

    /// No response arrived within the request timeout.
    #[error("Request timed out")]
    TimeoutError,

    /// The server answered the request with an error frame.
    #[error("{} ({}): {message}", .code.label(), .code.as_i64())]
    Protocol { code: ErrorCode, message: String },

    /// The authority descriptor has not been loaded by the auth provider.
    #[error("Authority is not loaded")]
    AuthorityNotLoaded,

    /// Gave up waiting for credentials; the fatal handler has been invoked.
    #[error("Unable to connect after {attempts} attempts")]
    ConnectExhausted { attempts: u32 },

    /// A frame could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid addressing or client configuration.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The client was shut down or an internal channel closed.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl PlaceLinkError {
    /// Build a protocol error from an inbound error frame.
    pub fn protocol(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    /// The server error code, when this is a protocol error.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// `true` for the local timeout rejection.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimeoutError)
    }
}

impl From<serde_json::Error> for PlaceLinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
