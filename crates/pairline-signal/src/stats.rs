//! Read-only counters for monitoring endpoints

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Snapshot counters published by the dispatcher after every event
#[derive(Debug)]
pub struct ServerStats {
    clients: AtomicUsize,
    rooms: AtomicUsize,
    started_at: Instant,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            clients: AtomicUsize::new(0),
            rooms: AtomicUsize::new(0),
            started_at: Instant::now(),
        }
    }

    /// Connected clients
    pub fn clients(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }

    /// Open rooms
    pub fn rooms(&self) -> usize {
        self.rooms.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub(crate) fn update(&self, clients: usize, rooms: usize) {
        self.clients.store(clients, Ordering::Relaxed);
        self.rooms.store(rooms, Ordering::Relaxed);
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}
