//! Graceful shutdown
//!
//! [`Shutdown`] is the hook: anything may trigger it, the server waits on it.
//! [`ShutdownCoordinator`] is what the dispatcher runs once it fires.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use pairline_core::ServerMessage;

use crate::registry::ConnectionRegistry;
use crate::room::RoomManager;

/// Notice broadcast to every connection on shutdown
pub const SHUTDOWN_NOTICE: &str = "Server is shutting down";

/// Cloneable shutdown trigger
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown. Returns true only for the first call.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|triggered| {
            if *triggered {
                false
            } else {
                *triggered = true;
                true
            }
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once shutdown has been requested
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for Ctrl-C, or SIGTERM on Unix
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// Notifies and drains every connection, at most once
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    completed: bool,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_run(&self) -> bool {
        self.completed
    }

    /// Broadcast the shutdown notice, close every transport, and empty the
    /// registry and room table. Returns the number of connections notified,
    /// or None if shutdown already ran.
    pub fn run(&mut self, registry: &mut ConnectionRegistry, rooms: &mut RoomManager) -> Option<usize> {
        if self.completed {
            return None;
        }
        self.completed = true;

        let notice = ServerMessage::ServerShutdown {
            message: SHUTDOWN_NOTICE.to_string(),
        };
        let ids = registry.ids_where(|_| true);
        for id in &ids {
            registry.send(id, &notice);
            if let Some(conn) = registry.get(id) {
                conn.handle().close();
            }
        }

        rooms.clear();
        let drained = registry.drain().len();
        info!("Shutdown notice sent to {} connection(s)", drained);
        Some(drained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ConnectionHandle, Outbound};
    use std::time::Duration;

    #[test]
    fn test_trigger_once() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());

        assert!(shutdown.trigger());
        assert!(!shutdown.clone().trigger());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_wait_after_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();

        // Already-triggered hooks resolve immediately
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_wakes_on_trigger() {
        let shutdown = Shutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait().await })
        };

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_coordinator_notifies_and_drains() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomManager::default();
        let (handle, mut rx) = ConnectionHandle::channel();
        let a = registry.register("127.0.0.1:4000".parse().unwrap(), handle);
        rooms.create(&mut registry, &a, Some("lobby")).unwrap();

        let mut coordinator = ShutdownCoordinator::new();
        assert_eq!(coordinator.run(&mut registry, &mut rooms), Some(1));

        match rx.try_recv().unwrap() {
            Outbound::Text(text) => {
                assert!(text.contains("server-shutdown"));
                assert!(text.contains(SHUTDOWN_NOTICE));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);

        assert!(registry.is_empty());
        assert!(rooms.is_empty());

        // Second run is a no-op
        assert!(coordinator.has_run());
        assert_eq!(coordinator.run(&mut registry, &mut rooms), None);
    }
}
