//! Module debug output streamed after a `debug` command.

use serde::{Deserialize, Serialize};

/// Severity attached to a module debug message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Fatal,
    /// Also used for levels this client does not know.
    #[default]
    #[serde(other)]
    Debug,
}

/// A debug log line emitted by a module the client is debugging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugEvent {
    /// Module instance ID on the server (`<empty>` when missing)
    pub mod_id: String,
    /// `Mod_idx` of the module as addressed by the client
    pub module: String,
    /// Driver class name (`<empty>` when missing)
    pub class_name: String,
    pub message: String,
    pub level: LogLevel,
    /// Seconds since Unix epoch at which the client received the line
    pub time: u64,
}
