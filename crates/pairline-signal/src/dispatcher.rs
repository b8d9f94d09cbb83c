//! Event dispatcher
//!
//! One task owns the connection registry and the room table and applies
//! events to them one at a time. Handlers never await, so each runs to
//! completion before the next event is looked at and no locking is needed.
//! Per-connection ordering comes from every connection task feeding the same
//! FIFO channel.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use pairline_core::{ClientId, ServerMessage};

use crate::heartbeat::HeartbeatMonitor;
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::room::RoomManager;
use crate::router;
use crate::shutdown::ShutdownCoordinator;
use crate::stats::ServerStats;

/// Everything that can happen to the shared state
#[derive(Debug)]
pub enum HubEvent {
    /// A transport finished its handshake. The reply carries the new id,
    /// or None if the server is shutting down.
    Connect {
        addr: SocketAddr,
        handle: ConnectionHandle,
        reply: oneshot::Sender<Option<ClientId>>,
    },
    /// A text frame arrived
    Message { id: ClientId, text: String },
    /// A probe was answered
    Pong { id: ClientId },
    /// The transport closed cleanly
    Close { id: ClientId },
    /// The transport failed
    Error { id: ClientId, reason: String },
    HeartbeatTick,
    /// Notify and drain everyone. Replies with the number notified.
    Shutdown { done: oneshot::Sender<usize> },
}

/// Owner of all connection and room state
#[derive(Debug)]
pub struct Dispatcher {
    registry: ConnectionRegistry,
    rooms: RoomManager,
    shutdown: ShutdownCoordinator,
    stats: Arc<ServerStats>,
}

impl Dispatcher {
    pub fn new(rooms: RoomManager, stats: Arc<ServerStats>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            rooms,
            shutdown: ShutdownCoordinator::new(),
            stats,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    /// Process events until every sender is gone
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<HubEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        debug!("Dispatcher stopped");
    }

    /// Apply a single event
    pub fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connect { addr, handle, reply } => {
                let id = self.connect(addr, handle);
                let _ = reply.send(id);
            }
            HubEvent::Message { id, text } => self.message(&id, &text),
            HubEvent::Pong { id } => {
                self.registry.mark_alive(&id);
            }
            HubEvent::Close { id } => {
                self.disconnect(&id, "closed");
            }
            HubEvent::Error { id, reason } => {
                if self.registry.contains(&id) {
                    warn!("Transport error for {}: {}", id, reason);
                }
                self.disconnect(&id, "transport error");
            }
            HubEvent::HeartbeatTick => self.heartbeat(),
            HubEvent::Shutdown { done } => {
                let notified = self
                    .shutdown
                    .run(&mut self.registry, &mut self.rooms)
                    .unwrap_or(0);
                let _ = done.send(notified);
            }
        }

        self.stats.update(self.registry.len(), self.rooms.len());
    }

    fn connect(&mut self, addr: SocketAddr, handle: ConnectionHandle) -> Option<ClientId> {
        if self.shutdown.has_run() {
            debug!("Turning away {} during shutdown", addr);
            handle.close();
            return None;
        }

        let id = self.registry.register(addr, handle);
        self.registry.send(
            &id,
            &ServerMessage::Welcome {
                client_id: id.clone(),
                timestamp: Utc::now(),
                total_clients: self.registry.len(),
            },
        );

        info!(
            "Client {} connected from {} ({} total)",
            id,
            addr,
            self.registry.len()
        );
        Some(id)
    }

    fn message(&mut self, id: &str, text: &str) {
        if !self.registry.contains(id) {
            debug!("Dropping message from unregistered connection {}", id);
            return;
        }

        if let Err(e) = router::route(&mut self.registry, &mut self.rooms, id, text) {
            debug!("Rejected message from {}: {}", id, e);
            self.registry.send(id, &ServerMessage::error(&e));
        }
    }

    /// Leave the room (notifying peers) and forget the connection.
    /// Returns false if it was already gone.
    fn disconnect(&mut self, id: &str, reason: &str) -> bool {
        if !self.registry.contains(id) {
            return false;
        }

        let role = self.registry.get(id).map(|c| c.role()).unwrap_or_default();
        router::leave_room(&mut self.registry, &mut self.rooms, id);
        let Some(conn) = self.registry.unregister(id) else {
            return false;
        };

        let connected_for = Utc::now().signed_duration_since(conn.connected_at());
        info!(
            "Client {} ({}) disconnected ({}) after {}s, {} remaining",
            id,
            role.as_str(),
            reason,
            connected_for.num_seconds(),
            self.registry.len()
        );
        true
    }

    fn heartbeat(&mut self) {
        for id in HeartbeatMonitor::sweep(&mut self.registry) {
            warn!("Client {} missed two heartbeats, evicting", id);
            if let Some(conn) = self.registry.get(&id) {
                conn.handle().close();
            }
            self.disconnect(&id, "heartbeat timeout");
        }
    }
}
