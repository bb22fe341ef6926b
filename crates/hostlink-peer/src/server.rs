//! Accept loop and per-connection tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use hostlink_bridge::{Bridge, Inbound};
use hostlink_settings::HostlinkSettings;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::connection::{OUTBOUND_CAPACITY, PeerConnection};
use crate::errors::{PeerError, Result};
use crate::handlers;
use crate::registry::ConnectionRegistry;

/// Loopback control-process server.
pub struct PeerServer {
    settings: Arc<HostlinkSettings>,
    connections: ConnectionRegistry,
    next_conn: AtomicU64,
}

impl PeerServer {
    /// A server answering with `settings`.
    pub fn new(settings: HostlinkSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            connections: ConnectionRegistry::new(),
            next_conn: AtomicU64::new(1),
        }
    }

    /// Effective settings.
    pub fn settings(&self) -> &HostlinkSettings {
        &self.settings
    }

    /// Live connections.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Bind the configured `peer.host:peer.port`.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.settings.peer.host, self.settings.peer.port);
        TcpListener::bind(&addr)
            .await
            .map_err(|source| PeerError::Bind { addr, source })
    }

    /// Send a fire-and-forget event to every connection.
    pub fn broadcast(&self, event: &str, data: &Value) -> usize {
        self.connections.broadcast(event, data)
    }

    /// Accept connections until `shutdown` is cancelled.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        info!(addr = ?listener.local_addr().ok(), "peer listening");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let server = Arc::clone(&self);
                    let token = shutdown.child_token();
                    drop(tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, addr, token).await {
                            warn!(%addr, error = %e, "connection failed");
                        }
                    }));
                }
            }
        }

        info!(connections = self.connections.len(), "peer shutting down");
        self.connections.close_all();
        Ok(())
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let ws = accept_async(stream).await?;
        let (mut sink, mut source) = ws.split();

        let id = format!("conn_{}", self.next_conn.fetch_add(1, Ordering::Relaxed));
        let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);
        let connection = Arc::new(PeerConnection::new(id.clone(), tx));
        let timeout = self.settings.calls.timeout_ms.map(Duration::from_millis);
        let bridge = Bridge::with_call_timeout(connection.clone(), timeout);
        let _handlers = handlers::install(&bridge, &self.settings);
        self.connections.add(connection.clone(), bridge.clone());
        info!(conn_id = %id, %addr, "client connected");

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if sink.send(message).await.is_err() || closing {
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                frame = source.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            log_outcome(&id, bridge.receive(text.as_str()));
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(conn_id = %id, error = %e, "read failed");
                            break;
                        }
                    }
                }
            }
        }

        let _ = self.connections.remove(&id);
        connection.close();
        let _ = tokio::time::timeout(Duration::from_secs(1), writer).await;
        info!(
            conn_id = %id,
            age_ms = u64::try_from(connection.age().as_millis()).unwrap_or(u64::MAX),
            pending = bridge.pending_count(),
            "client disconnected"
        );
        Ok(())
    }
}

fn log_outcome(conn_id: &str, outcome: Inbound) {
    match outcome {
        Inbound::Event { handlers } => debug!(conn_id, handlers, "event received"),
        Inbound::Unhandled(id) => debug!(conn_id, %id, "no handler for call"),
        Inbound::Unmatched(id) => debug!(conn_id, %id, "response for unknown call"),
        Inbound::Malformed => debug!(conn_id, "malformed frame"),
        Inbound::Routed { .. } | Inbound::Resolved(_) => trace!(conn_id, ?outcome, "frame handled"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_uses_configured_address() {
        let mut settings = HostlinkSettings::default();
        settings.peer.port = 0;
        let server = PeerServer::new(settings);
        let listener = server.bind().await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn bind_failure_reports_address() {
        let mut settings = HostlinkSettings::default();
        settings.peer.host = "192.0.2.1".into();
        settings.peer.port = 0;
        let err = PeerServer::new(settings).bind().await.unwrap_err();
        assert!(matches!(err, PeerError::Bind { ref addr, .. } if addr == "192.0.2.1:0"));
    }

    #[tokio::test]
    async fn serve_stops_on_cancel() {
        let mut settings = HostlinkSettings::default();
        settings.peer.port = 0;
        let server = Arc::new(PeerServer::new(settings));
        let listener = server.bind().await.unwrap();
        let token = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&server).serve(listener, token.clone()));
        token.cancel();
        assert!(handle.await.unwrap().is_ok());
    }
}
