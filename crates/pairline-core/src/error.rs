//! Error types for the Pairline relay

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while handling a client request.
///
/// Every variant is local to the connection that triggered it: the relay
/// reports it back as an `error` message and keeps the connection open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("room {0} already exists")]
    RoomAlreadyExists(String),

    #[error("room id is required")]
    RoomIdRequired,

    #[error("room {0} not found")]
    RoomNotFound(String),

    #[error("room {0} is full")]
    RoomFull(String),

    #[error("not in a room")]
    NotInRoom,

    #[error("already in room {0}")]
    AlreadyInRoom(String),

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("invalid message format: {0}")]
    InvalidMessageFormat(String),

    #[error("connection {0} is not registered")]
    ConnectionNotFound(String),

    #[error("entropy source unavailable: {0}")]
    Entropy(String),

    #[error("no unused room codes of length {0} left")]
    RoomCodesExhausted(usize),
}

/// Wire error codes (sent alongside the human-readable message)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    RoomAlreadyExists,
    RoomIdRequired,
    RoomNotFound,
    RoomFull,
    NotInRoom,
    AlreadyInRoom,
    UnknownMessageType,
    InvalidMessageFormat,
    RoomCodesExhausted,
    InternalError,
}

impl From<&SignalError> for ErrorCode {
    fn from(e: &SignalError) -> Self {
        match e {
            SignalError::RoomAlreadyExists(_) => ErrorCode::RoomAlreadyExists,
            SignalError::RoomIdRequired => ErrorCode::RoomIdRequired,
            SignalError::RoomNotFound(_) => ErrorCode::RoomNotFound,
            SignalError::RoomFull(_) => ErrorCode::RoomFull,
            SignalError::NotInRoom => ErrorCode::NotInRoom,
            SignalError::AlreadyInRoom(_) => ErrorCode::AlreadyInRoom,
            SignalError::UnknownMessageType(_) => ErrorCode::UnknownMessageType,
            SignalError::InvalidMessageFormat(_) => ErrorCode::InvalidMessageFormat,
            SignalError::RoomCodesExhausted(_) => ErrorCode::RoomCodesExhausted,
            SignalError::ConnectionNotFound(_) | SignalError::Entropy(_) => {
                ErrorCode::InternalError
            }
        }
    }
}

impl From<serde_json::Error> for SignalError {
    fn from(e: serde_json::Error) -> Self {
        SignalError::InvalidMessageFormat(e.to_string())
    }
}
