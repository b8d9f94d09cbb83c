//! Pairline Signal Server
//!
//! Rendezvous relay for two-party session setup. Clients connect over
//! WebSocket, pair up in rooms of at most two, and the server forwards
//! opaque negotiation payloads between them.
//!
//! # Protocol
//!
//! 1. Caller creates a room (named or with a generated code)
//! 2. Callee joins the room by id; both sides are told who is present
//! 3. `offer`, `answer`, `candidate` and `ping` are relayed to the peer
//! 4. `hangup` is relayed and the sender leaves the room
//! 5. Disconnects, explicit or detected by heartbeat, notify the peer
//!
//! The same port answers plain `GET /health`, `GET /info` and `GET /`.

pub mod dispatcher;
pub mod heartbeat;
pub mod http;
pub mod registry;
pub mod room;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod stats;

pub use dispatcher::{Dispatcher, HubEvent};
pub use heartbeat::{HeartbeatHandle, HeartbeatMonitor};
pub use registry::{Connection, ConnectionHandle, ConnectionRegistry, Outbound, Role};
pub use room::{JoinOutcome, LeaveOutcome, Room, RoomManager};
pub use server::SignalServer;
pub use shutdown::{wait_for_signal, Shutdown, ShutdownCoordinator, SHUTDOWN_NOTICE};
pub use stats::ServerStats;

pub use pairline_core::{Config, DEFAULT_PORT, MAX_ROOM_ID_LENGTH, MAX_ROOM_MEMBERS};
