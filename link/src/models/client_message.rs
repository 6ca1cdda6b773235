use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

use super::request_address::RequestAddress;

/// Command verbs understood by the realtime endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Start receiving `notify` frames for a status variable
    Bind,
    /// Stop receiving `notify` frames for a status variable
    Unbind,
    /// Execute a method on a module
    Exec,
    /// Start streaming module debug logs
    Debug,
    /// Stop streaming module debug logs
    Ignore,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Bind => "bind",
            CommandKind::Unbind => "unbind",
            CommandKind::Exec => "exec",
            CommandKind::Debug => "debug",
            CommandKind::Ignore => "ignore",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound command frame.
///
/// Serialized flat: `{"id":1,"cmd":"bind","sys":"sys-A0","mod":"Display","index":1,"name":"power"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Wire request ID echoed back by the server in `success`/`error`
    pub id: u64,

    /// Command verb
    pub cmd: CommandKind,

    #[serde(flatten)]
    pub address: RequestAddress,

    /// Method arguments (exec only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<JsonValue>>,
}

impl CommandRequest {
    pub fn new(id: u64, cmd: CommandKind, address: RequestAddress) -> Self {
        Self {
            id,
            cmd,
            address,
            args: None,
        }
    }

    pub fn with_args(mut self, args: Vec<JsonValue>) -> Self {
        self.args = Some(args);
        self
    }
}
