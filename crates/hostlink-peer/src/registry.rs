//! Live connections and event fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use hostlink_bridge::Bridge;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::connection::PeerConnection;

struct Entry {
    connection: Arc<PeerConnection>,
    bridge: Bridge,
}

/// Connected clients indexed by connection ID.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl ConnectionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection and the bridge running over it.
    pub fn add(&self, connection: Arc<PeerConnection>, bridge: Bridge) {
        let _ = self.entries.write().insert(
            connection.id.clone(),
            Entry { connection, bridge },
        );
    }

    /// Stop tracking a connection.
    pub fn remove(&self, connection_id: &str) -> bool {
        self.entries.write().remove(connection_id).is_some()
    }

    /// Bridge for one connection, for server-initiated calls.
    pub fn bridge(&self, connection_id: &str) -> Option<Bridge> {
        self.entries
            .read()
            .get(connection_id)
            .map(|e| e.bridge.clone())
    }

    /// Connection handle by ID.
    pub fn connection(&self, connection_id: &str) -> Option<Arc<PeerConnection>> {
        self.entries
            .read()
            .get(connection_id)
            .map(|e| Arc::clone(&e.connection))
    }

    /// IDs of every live connection, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no connection is live.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Send a fire-and-forget event to every connection.
    ///
    /// Returns how many connections accepted it.
    pub fn broadcast(&self, event: &str, data: &Value) -> usize {
        let entries = self.entries.read();
        let recipients = entries.len();
        debug!(event, recipients, "broadcast event to all");

        let mut delivered = 0;
        for entry in entries.values() {
            if entry.bridge.send(event, data.clone()) {
                delivered += 1;
            } else {
                warn!(conn_id = %entry.connection.id, event, "failed to send event to client");
            }
        }
        delivered
    }

    /// Ask every connection to close.
    pub fn close_all(&self) {
        for entry in self.entries.read().values() {
            entry.connection.close();
        }
    }
}
