use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::client_message::CommandRequest;
use super::debug_event::LogLevel;
use super::error_code::ErrorCode;
use super::request_address::RequestAddress;

/// Addressing attached to a `debug` frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugMeta {
    #[serde(rename = "mod", default)]
    pub module: String,
    #[serde(default)]
    pub index: JsonValue,
}

/// Frames sent from the server to the client (everything except `"pong"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A command completed
    Success {
        /// Wire ID of the command
        id: u64,
        /// Result of `exec`, `null` otherwise
        #[serde(default)]
        value: JsonValue,
    },

    /// A command failed
    Error {
        /// Wire ID of the command
        id: u64,
        code: ErrorCode,
        #[serde(default)]
        msg: String,
    },

    /// A bound status variable changed
    Notify {
        meta: RequestAddress,
        #[serde(default)]
        value: JsonValue,
    },

    /// Module debug output
    Debug {
        #[serde(rename = "mod", default, skip_serializing_if = "Option::is_none")]
        mod_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        klass: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        level: Option<LogLevel>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<DebugMeta>,
    },
}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Literal `"pong"` heartbeat reply
    Pong,
    /// A recognised server message
    Message(ServerMessage),
    /// An echoed command frame; not an error, not routed
    Command(CommandRequest),
    /// Anything else
    Unknown(JsonValue),
}

impl InboundFrame {
    /// Classify one text frame. Never fails: undecodable input becomes
    /// [`InboundFrame::Unknown`].
    pub fn parse(text: &str) -> Self {
        if text == "pong" {
            return InboundFrame::Pong;
        }
        let value: JsonValue = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_) => return InboundFrame::Unknown(JsonValue::String(text.to_string())),
        };
        if value.as_str() == Some("pong") {
            return InboundFrame::Pong;
        }
        if value.get("type").is_some() {
            if let Ok(message) = serde_json::from_value::<ServerMessage>(value.clone()) {
                return InboundFrame::Message(message);
            }
        }
        if value.get("cmd").is_some() {
            if let Ok(command) = serde_json::from_value::<CommandRequest>(value.clone()) {
                return InboundFrame::Command(command);
            }
        }
        InboundFrame::Unknown(value)
    }
}
