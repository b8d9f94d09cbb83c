//! Signal protocol messages
//!
//! Every frame is a flat JSON object with a kebab-case `type` tag and
//! camelCase fields. Inbound frames are parsed into the closed
//! [`ClientMessage`] set; relayed frames keep their payload untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ErrorCode, SignalError};

/// Opaque connection identifier
pub type ClientId = String;

/// Room code
pub type RoomId = String;

/// Message types that are forwarded verbatim to room peers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelayKind {
    Offer,
    Answer,
    Candidate,
    Hangup,
    Ping,
}

impl RelayKind {
    /// Look up a relay kind by its wire tag
    pub fn from_type(tag: &str) -> Option<Self> {
        match tag {
            "offer" => Some(Self::Offer),
            "answer" => Some(Self::Answer),
            "candidate" => Some(Self::Candidate),
            "hangup" => Some(Self::Hangup),
            "ping" => Some(Self::Ping),
            _ => None,
        }
    }

    /// Wire tag
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
            Self::Hangup => "hangup",
            Self::Ping => "ping",
        }
    }
}

impl std::fmt::Display for RelayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A peer-to-peer message waiting to be forwarded
#[derive(Clone, Debug, PartialEq)]
pub struct RelayMessage {
    pub kind: RelayKind,
    /// Every field except `type`, exactly as the client sent them
    pub fields: Map<String, Value>,
}

impl RelayMessage {
    /// Serialize for delivery, stamping `sender` over any client-supplied value
    pub fn stamped(&self, sender: &str) -> Result<String, serde_json::Error> {
        let mut fields = self.fields.clone();
        fields.insert("type".into(), Value::String(self.kind.as_str().into()));
        fields.insert("sender".into(), Value::String(sender.into()));
        serde_json::to_string(&fields)
    }
}

/// Messages accepted from clients
#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    CreateRoom { room_id: Option<String> },
    JoinRoom { room_id: String },
    ListRooms,
    Relay(RelayMessage),
}

impl ClientMessage {
    /// Parse a raw text frame
    pub fn parse(text: &str) -> Result<Self, SignalError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut fields) = value else {
            return Err(SignalError::InvalidMessageFormat(
                "expected a JSON object".into(),
            ));
        };

        let tag = match fields.remove("type") {
            Some(Value::String(tag)) => tag,
            Some(_) => {
                return Err(SignalError::InvalidMessageFormat(
                    "`type` must be a string".into(),
                ))
            }
            None => {
                return Err(SignalError::InvalidMessageFormat(
                    "missing `type` field".into(),
                ))
            }
        };

        match tag.as_str() {
            "create-room" => Ok(Self::CreateRoom {
                room_id: optional_string(&fields, "roomId")?,
            }),
            "join-room" => Ok(Self::JoinRoom {
                room_id: optional_string(&fields, "roomId")?.unwrap_or_default(),
            }),
            "list-rooms" => Ok(Self::ListRooms),
            other => match RelayKind::from_type(other) {
                Some(kind) => Ok(Self::Relay(RelayMessage { kind, fields })),
                None => Err(SignalError::UnknownMessageType(other.to_string())),
            },
        }
    }
}

/// Read an optional string field; `null` counts as absent
fn optional_string(fields: &Map<String, Value>, key: &str) -> Result<Option<String>, SignalError> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(SignalError::InvalidMessageFormat(format!(
            "`{}` must be a string",
            key
        ))),
    }
}

/// One row of a `room-list` response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub client_count: usize,
    pub created_by: ClientId,
    pub created_at: DateTime<Utc>,
}

/// Messages sent by the relay
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// First frame on every new connection
    #[serde(rename_all = "camelCase")]
    Welcome {
        client_id: ClientId,
        timestamp: DateTime<Utc>,
        total_clients: usize,
    },

    #[serde(rename_all = "camelCase")]
    RoomCreated { room_id: RoomId, client_id: ClientId },

    /// Sent to the joiner only
    #[serde(rename_all = "camelCase")]
    RoomJoined {
        room_id: RoomId,
        client_id: ClientId,
        other_clients: Vec<ClientId>,
    },

    /// Sent to every member of the room, joiner included
    #[serde(rename_all = "camelCase")]
    PeerJoined {
        room_id: RoomId,
        client_id: ClientId,
        total_clients: usize,
    },

    #[serde(rename_all = "camelCase")]
    PeerDisconnected { client_id: ClientId, room_id: RoomId },

    #[serde(rename_all = "camelCase")]
    RoomList {
        rooms: Vec<RoomSummary>,
        total_rooms: usize,
        total_clients: usize,
    },

    Error { message: String, code: ErrorCode },

    ServerShutdown { message: String },
}

impl ServerMessage {
    /// Create an error message
    pub fn error(err: &SignalError) -> Self {
        Self::Error {
            message: err.to_string(),
            code: ErrorCode::from(err),
        }
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
