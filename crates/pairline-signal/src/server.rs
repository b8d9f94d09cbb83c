//! WebSocket signal server implementation

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

use pairline_core::Config;

use crate::dispatcher::{Dispatcher, HubEvent};
use crate::heartbeat::HeartbeatMonitor;
use crate::http::{self, HttpContext};
use crate::registry::{ConnectionHandle, Outbound};
use crate::room::RoomManager;
use crate::shutdown::Shutdown;
use crate::stats::ServerStats;

/// Signal server state
pub struct SignalServer {
    config: Config,
    shutdown: Shutdown,
    stats: Arc<ServerStats>,
}

impl SignalServer {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            shutdown: Shutdown::new(),
            stats: Arc::new(ServerStats::new()),
        }
    }

    /// Hook that stops [`serve`](Self::serve) when triggered
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Get room count (for monitoring)
    pub fn room_count(&self) -> usize {
        self.stats.rooms()
    }

    /// Get client count (for monitoring)
    pub fn client_count(&self) -> usize {
        self.stats.clients()
    }

    /// Start the signal server
    pub async fn serve(&self, addr: SocketAddr) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        info!("Signal server listening on {}", addr);
        self.serve_listener(listener).await
    }

    /// Serve on an already bound listener until shutdown is triggered
    pub async fn serve_listener(&self, listener: TcpListener) -> Result<(), std::io::Error> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let rooms = RoomManager::new(self.config.signal.room_code_length)
            .with_max_id_length(self.config.signal.max_room_id_length);
        let dispatcher = Dispatcher::new(rooms, Arc::clone(&self.stats));
        let hub = tokio::spawn(dispatcher.run(events_rx));

        let monitor = HeartbeatMonitor::new(self.config.heartbeat.interval());
        debug!("Probing connections every {:?}", monitor.interval());
        let heartbeat = monitor.spawn(events_tx.clone());
        let http_ctx = Arc::new(HttpContext::new(&self.config, Arc::clone(&self.stats)));
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        let events = events_tx.clone();
                        let http_ctx = Arc::clone(&http_ctx);
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, peer_addr, events, http_ctx).await {
                                debug!("Connection error from {}: {:?}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => warn!("Failed to accept connection: {}", e),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = self.shutdown.wait() => break,
            }
        }

        info!("Shutting down signal server");
        drop(listener);
        heartbeat.stop();

        let (done_tx, done_rx) = oneshot::channel();
        let notified = if events_tx.send(HubEvent::Shutdown { done: done_tx }).is_ok() {
            done_rx.await.unwrap_or(0)
        } else {
            0
        };
        drop(events_tx);
        debug!("{} connection(s) notified of shutdown", notified);

        let grace = self.config.signal.shutdown_grace();
        let drained = tokio::time::timeout(grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                "{} connection(s) still open after {:?}, aborting",
                connections.len(),
                grace
            );
            connections.shutdown().await;
        }

        drop(heartbeat);
        if let Err(e) = hub.await {
            warn!("Dispatcher task failed: {}", e);
        }

        info!("Signal server stopped");
        Ok(())
    }
}

/// Handle a single connection (HTTP or WebSocket)
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    events: mpsc::UnboundedSender<HubEvent>,
    http_ctx: Arc<HttpContext>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if http::is_plain_http(&stream).await? {
        http::respond(&mut stream, &http_ctx).await?;
        return Ok(());
    }

    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (handle, mut outbound) = ConnectionHandle::channel();
    let (reply_tx, reply_rx) = oneshot::channel();
    events.send(HubEvent::Connect {
        addr: peer_addr,
        handle,
        reply: reply_tx,
    })?;

    let Some(client_id) = reply_rx.await? else {
        let _ = ws_sender.close().await;
        return Ok(());
    };
    debug!("New connection from {} as {}", peer_addr, client_id);

    let mut failure: Option<String> = None;

    loop {
        tokio::select! {
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(HubEvent::Message { id: client_id.clone(), text });
                }
                Some(Ok(Message::Binary(data))) => {
                    let text = String::from_utf8_lossy(&data).into_owned();
                    let _ = events.send(HubEvent::Message { id: client_id.clone(), text });
                }
                // tungstenite queues the pong itself and flushes it on the next read
                Some(Ok(Message::Ping(_))) => {}
                Some(Ok(Message::Pong(_))) => {
                    let _ = events.send(HubEvent::Pong { id: client_id.clone() });
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => {
                    failure = Some(e.to_string());
                    break;
                }
            },
            out = outbound.recv() => match out {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = ws_sender.send(Message::Text(text)).await {
                        failure = Some(e.to_string());
                        break;
                    }
                }
                Some(Outbound::Probe) => {
                    if let Err(e) = ws_sender.send(Message::Ping(Vec::new())).await {
                        failure = Some(e.to_string());
                        break;
                    }
                }
                // Closed by the server, or dropped from the registry
                Some(Outbound::Close) | None => {
                    let _ = ws_sender.close().await;
                    break;
                }
            },
        }
    }

    let event = match failure {
        Some(reason) => HubEvent::Error {
            id: client_id.clone(),
            reason,
        },
        None => HubEvent::Close {
            id: client_id.clone(),
        },
    };
    let _ = events.send(event);

    debug!("Connection closed: {}", client_id);
    Ok(())
}
