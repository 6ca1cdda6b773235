use serde::{Deserialize, Serialize};

/// Error codes carried by inbound `error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ErrorCode {
    ParseError,
    BadRequest,
    AccessDenied,
    RequestFailed,
    UnknownCommand,
    SystemNotFound,
    ModuleNotFound,
    UnexpectedFailure,
    /// A code this client does not know about
    Other(i64),
}

impl ErrorCode {
    pub fn as_i64(&self) -> i64 {
        match self {
            ErrorCode::ParseError => 0,
            ErrorCode::BadRequest => 1,
            ErrorCode::AccessDenied => 2,
            ErrorCode::RequestFailed => 3,
            ErrorCode::UnknownCommand => 4,
            ErrorCode::SystemNotFound => 5,
            ErrorCode::ModuleNotFound => 6,
            ErrorCode::UnexpectedFailure => 7,
            ErrorCode::Other(code) => *code,
        }
    }

    /// Upper-case label used in log lines.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "PARSE ERROR",
            ErrorCode::BadRequest => "BAD REQUEST",
            ErrorCode::AccessDenied => "ACCESS DENIED",
            ErrorCode::RequestFailed => "REQUEST FAILED",
            ErrorCode::UnknownCommand => "UNKNOWN COMMAND",
            ErrorCode::SystemNotFound => "SYSTEM NOT FOUND",
            ErrorCode::ModuleNotFound => "MODULE NOT FOUND",
            ErrorCode::UnexpectedFailure | ErrorCode::Other(_) => "UNEXPECTED FAILURE",
        }
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        match code {
            0 => ErrorCode::ParseError,
            1 => ErrorCode::BadRequest,
            2 => ErrorCode::AccessDenied,
            3 => ErrorCode::RequestFailed,
            4 => ErrorCode::UnknownCommand,
            5 => ErrorCode::SystemNotFound,
            6 => ErrorCode::ModuleNotFound,
            7 => ErrorCode::UnexpectedFailure,
            other => ErrorCode::Other(other),
        }
    }
}

impl From<ErrorCode> for i64 {
    fn from(code: ErrorCode) -> Self {
        code.as_i64()
    }
}
