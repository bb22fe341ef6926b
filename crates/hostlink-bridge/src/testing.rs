//! In-memory transport for tests in this and downstream crates.

use std::sync::atomic::{AtomicBool, Ordering};

use hostlink_core::{BridgeError, Envelope, Result};
use parking_lot::Mutex;
use serde_json::Value;

use crate::transport::Transport;

/// Records every posted frame. Availability can be toggled.
#[derive(Debug)]
pub struct RecordingTransport {
    available: AtomicBool,
    frames: Mutex<Vec<String>>,
}

impl RecordingTransport {
    /// An available transport with no frames.
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            frames: Mutex::new(Vec::new()),
        }
    }

    /// A transport that rejects every frame.
    pub fn unavailable() -> Self {
        let transport = Self::new();
        transport.set_available(false);
        transport
    }

    /// Toggle availability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Copy of every frame posted so far.
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    /// Drain the recorded frames.
    pub fn take_frames(&self) -> Vec<String> {
        std::mem::take(&mut *self.frames.lock())
    }

    /// Recorded frames parsed as JSON values.
    pub fn values(&self) -> Vec<Value> {
        self.frames
            .lock()
            .iter()
            .filter_map(|f| serde_json::from_str(f).ok())
            .collect()
    }

    /// Recorded frames parsed as envelopes.
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.frames
            .lock()
            .iter()
            .filter_map(|f| Envelope::parse(f).ok())
            .collect()
    }

    /// Most recent frame parsed as JSON.
    pub fn last_value(&self) -> Option<Value> {
        self.frames
            .lock()
            .last()
            .and_then(|f| serde_json::from_str(f).ok())
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for RecordingTransport {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn post(&self, frame: String) -> Result<()> {
        if !self.is_available() {
            return Err(BridgeError::TransportUnavailable);
        }
        self.frames.lock().push(frame);
        Ok(())
    }
}
