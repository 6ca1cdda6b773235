//! Data models for place-link.
//!
//! Defines the command frames sent to the realtime endpoint, the frames it
//! sends back, and the configuration/state types exposed to callers.

pub mod client_message;
pub mod connection_options;
pub mod connection_state;
pub mod debug_event;
pub mod error_code;
pub mod request_address;
pub mod server_message;

#[cfg(test)]
mod tests;

pub use client_message::{CommandKind, CommandRequest};
pub use connection_options::ConnectionOptions;
pub use connection_state::{ConnectionState, SessionSync};
pub use debug_event::{DebugEvent, LogLevel};
pub use error_code::ErrorCode;
pub use request_address::RequestAddress;
pub use server_message::{DebugMeta, InboundFrame, ServerMessage};
