//! The outbound seam every bridge writes through.

use hostlink_core::{BridgeError, Result};

/// One-way text channel to the remote peer.
///
/// Implementations only move serialized frames. Correlation, routing, and
/// retries live above this trait.
pub trait Transport: Send + Sync {
    /// Whether `post` can currently deliver a frame.
    fn is_available(&self) -> bool;

    /// Hand one serialized envelope to the peer.
    ///
    /// Returns [`BridgeError::TransportUnavailable`] when the frame was not
    /// accepted. Acceptance says nothing about delivery.
    fn post(&self, frame: String) -> Result<()>;
}

/// A transport that is never available.
#[derive(Clone, Copy, Debug, Default)]
pub struct Detached;

impl Transport for Detached {
    fn is_available(&self) -> bool {
        false
    }

    fn post(&self, _frame: String) -> Result<()> {
        Err(BridgeError::TransportUnavailable)
    }
}
