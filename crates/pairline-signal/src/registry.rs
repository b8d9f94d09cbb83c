//! Live connection tracking
//!
//! The registry is the source of truth for who is connected. It owns each
//! [`Connection`] for its whole lifetime; rooms and the router refer to
//! connections only by id.

use std::collections::HashMap;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::warn;

use pairline_core::ids::generate_client_id;
use pairline_core::{ClientId, RoomId, ServerMessage};

/// Instructions for a connection's transport task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send a text frame
    Text(String),
    /// Send a liveness probe (WebSocket ping)
    Probe,
    /// Close the transport
    Close,
}

/// Sending half of a connection's outbound queue
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver its transport task drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a text frame. Returns false if the transport is gone.
    pub fn send_text(&self, text: String) -> bool {
        self.tx.send(Outbound::Text(text)).is_ok()
    }

    pub fn probe(&self) -> bool {
        self.tx.send(Outbound::Probe).is_ok()
    }

    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

/// Position of a connection in its room
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Role {
    #[default]
    None,
    /// Created the room
    Caller,
    /// Joined an existing room
    Callee,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::None => "none",
            Role::Caller => "caller",
            Role::Callee => "callee",
        }
    }
}

/// A live client connection
#[derive(Debug)]
pub struct Connection {
    id: ClientId,
    addr: SocketAddr,
    connected_at: DateTime<Utc>,
    pub(crate) room_id: Option<RoomId>,
    pub(crate) role: Role,
    pub(crate) is_alive: bool,
    handle: ConnectionHandle,
}

impl Connection {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Room this connection belongs to, if any
    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the connection answered the last probe
    pub fn is_alive(&self) -> bool {
        self.is_alive
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }
}

/// All live connections, keyed by id
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ClientId, Connection>,
    /// Ids handed out when the entropy source fails
    fallback_seq: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and return its fresh id
    pub fn register(&mut self, addr: SocketAddr, handle: ConnectionHandle) -> ClientId {
        let id = self.fresh_id();
        self.connections.insert(
            id.clone(),
            Connection {
                id: id.clone(),
                addr,
                connected_at: Utc::now(),
                room_id: None,
                role: Role::None,
                is_alive: true,
                handle,
            },
        );
        id
    }

    fn fresh_id(&mut self) -> ClientId {
        loop {
            let id = match generate_client_id() {
                Ok(id) => id,
                Err(e) => {
                    warn!("Client id generation failed ({}), using sequence id", e);
                    self.fallback_seq += 1;
                    format!("conn-{}", self.fallback_seq)
                }
            };
            if !self.connections.contains_key(&id) {
                return id;
            }
        }
    }

    /// Remove a connection. Unregistering an unknown id is a no-op.
    pub fn unregister(&mut self, id: &str) -> Option<Connection> {
        self.connections.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.values_mut()
    }

    /// Ids of every connection matching `predicate`
    pub fn ids_where(&self, predicate: impl Fn(&Connection) -> bool) -> Vec<ClientId> {
        self.connections
            .values()
            .filter(|c| predicate(c))
            .map(|c| c.id.clone())
            .collect()
    }

    /// Record a probe response
    pub fn mark_alive(&mut self, id: &str) -> bool {
        match self.connections.get_mut(id) {
            Some(conn) => {
                conn.is_alive = true;
                true
            }
            None => false,
        }
    }

    /// Serialize and queue a message for one connection
    pub fn send(&self, id: &str, msg: &ServerMessage) -> bool {
        match msg.to_json() {
            Ok(json) => self.send_text(id, json),
            Err(e) => {
                warn!("Failed to serialize message for {}: {}", id, e);
                false
            }
        }
    }

    /// Queue a pre-serialized frame for one connection
    pub fn send_text(&self, id: &str, text: String) -> bool {
        self.connections
            .get(id)
            .map(|conn| conn.handle.send_text(text))
            .unwrap_or(false)
    }

    /// Remove every connection
    pub fn drain(&mut self) -> Vec<Connection> {
        self.connections.drain().map(|(_, conn)| conn).collect()
    }
}
