//! One accepted WebSocket client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use hostlink_bridge::Transport;
use hostlink_core::{BridgeError, Result};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Capacity of each connection's outbound queue.
pub const OUTBOUND_CAPACITY: usize = 256;

/// A connected client and the queue feeding its write task.
#[derive(Debug)]
pub struct PeerConnection {
    /// Unique connection ID.
    pub id: String,
    tx: mpsc::Sender<Message>,
    connected_at: Instant,
    dropped_frames: AtomicU64,
}

impl PeerConnection {
    /// Wrap the sender half of a write queue.
    pub fn new(id: String, tx: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Queue one text frame.
    ///
    /// Returns `false` if the queue is full or closed, and counts the drop.
    pub fn send(&self, text: String) -> bool {
        if self.tx.try_send(Message::text(text)).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Ask the write task to send a close frame and stop.
    pub fn close(&self) {
        let _ = self.tx.try_send(Message::Close(None));
    }

    /// Frames dropped because the queue was full or closed.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl Transport for PeerConnection {
    fn is_available(&self) -> bool {
        !self.tx.is_closed()
    }

    fn post(&self, frame: String) -> Result<()> {
        if self.send(frame) {
            Ok(())
        } else {
            Err(BridgeError::TransportUnavailable)
        }
    }
}
