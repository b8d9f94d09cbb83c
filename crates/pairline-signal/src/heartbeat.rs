//! Liveness probing
//!
//! Every tick, connections that never answered the previous probe are
//! evicted and the rest are probed again, so a peer that stays silent for
//! two consecutive periods is removed. This is the only way half-open
//! sockets (no close or error ever fires) get cleaned up.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use pairline_core::ClientId;

use crate::dispatcher::HubEvent;
use crate::registry::ConnectionRegistry;

/// Periodic liveness checker
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    interval: Duration,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one heartbeat pass over the registry.
    ///
    /// Returns the connections that missed the previous probe; the caller
    /// evicts them. Every other connection is marked pending and probed.
    pub fn sweep(registry: &mut ConnectionRegistry) -> Vec<ClientId> {
        let mut unresponsive = Vec::new();

        for conn in registry.iter_mut() {
            if !conn.is_alive {
                unresponsive.push(conn.id().to_string());
                continue;
            }
            conn.is_alive = false;
            conn.handle().probe();
        }

        unresponsive
    }

    /// Start emitting [`HubEvent::HeartbeatTick`] once per interval.
    /// The first tick fires one full interval after start.
    pub fn spawn(&self, events: mpsc::UnboundedSender<HubEvent>) -> HeartbeatHandle {
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut tick = interval_at(Instant::now() + period, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tick.tick().await;
                if events.send(HubEvent::HeartbeatTick).is_err() {
                    debug!("Dispatcher gone, stopping heartbeat");
                    break;
                }
            }
        });

        HeartbeatHandle { task }
    }
}

/// Owned handle to the ticking task; dropping it stops the heartbeat
#[derive(Debug)]
pub struct HeartbeatHandle {
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
