//! Centralized helpers for signaling error events.
//!
//! Use these helpers to ensure all error events carry a stable code and a consistent message.
use crate::protocol::ServerMessage;

/// Error codes sent in the `error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidMessage,
    InvalidConnectionInfo,
    AlreadyQueued,
    AlreadyInMatch,
    DuplicatePlayer,
    RateLimited,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidMessage => "INVALID_MESSAGE",
            ErrorCode::InvalidConnectionInfo => "INVALID_CONNECTION_INFO",
            ErrorCode::AlreadyQueued => "ALREADY_QUEUED",
            ErrorCode::AlreadyInMatch => "ALREADY_IN_MATCH",
            ErrorCode::DuplicatePlayer => "DUPLICATE_PLAYER",
            ErrorCode::RateLimited => "RATE_LIMITED",
        }
    }

    /// Human-readable message (in English).
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidMessage => "Invalid client message",
            ErrorCode::InvalidConnectionInfo => "Connection info needs an IPv4 address and a non-zero port.",
            ErrorCode::AlreadyQueued => "You are already searching for a match.",
            ErrorCode::AlreadyInMatch => "You are already in a match.",
            ErrorCode::DuplicatePlayer => "Another connection is already using this player id.",
            ErrorCode::RateLimited => "Too many messages. Please try again later.",
        }
    }
}

/// Builds the `error` event for `code`.
pub fn error_message(code: ErrorCode) -> ServerMessage {
    ServerMessage::error(code.as_str(), code.message())
}

/// Serialized `error` event, for paths that write raw text to the socket.
pub fn ws_error_text(code: ErrorCode) -> String {
    serde_json::to_string(&error_message(code)).unwrap_or_else(|_| {
        format!(
            r#"{{"event":"error","data":{{"code":"{}","message":"{}"}}}}"#,
            code.as_str(),
            code.message()
        )
    })
}
