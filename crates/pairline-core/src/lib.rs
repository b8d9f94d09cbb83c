//! Pairline Core - Shared types, wire protocol, and configuration
//!
//! This crate contains the foundational types used by the Pairline relay.
//! It has no dependencies on networking code.

pub mod config;
pub mod error;
pub mod ids;
pub mod protocol;

pub use config::{Config, ConfigError, HeartbeatConfig, SignalConfig};
pub use error::{ErrorCode, SignalError};
pub use protocol::{ClientId, ClientMessage, RelayKind, RoomId, RoomSummary, ServerMessage};

/// Default WebSocket/HTTP port
pub const DEFAULT_PORT: u16 = 8080;

/// Maximum members per room (one caller, one callee)
pub const MAX_ROOM_MEMBERS: usize = 2;

/// Default cap on client-chosen room ids, in bytes
pub const MAX_ROOM_ID_LENGTH: usize = 64;

/// Default heartbeat period in seconds
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Default time to wait for connections to close on shutdown
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;
