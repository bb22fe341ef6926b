//! Error taxonomy for the bridge.
//!
//! Only [`BridgeError`] ever reaches a caller. Parse failures, unmatched
//! responses, and unhandled requests are local no-ops reported through the
//! bridge's receive outcome, never through an error channel.

use thiserror::Error;

use crate::ids::CorrelationId;

/// Message delivered when the remote side fails a call without a reason.
pub const DEFAULT_HOST_ERROR: &str = "Unknown error";

/// Errors surfaced to the issuer of a call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The transport's send primitive was not available at call time.
    #[error("transport unavailable")]
    TransportUnavailable,

    /// The remote side answered with `success: false`.
    #[error("{0}")]
    Host(String),

    /// An opt-in deadline elapsed before the response arrived.
    #[error("call {id} timed out after {timeout_ms}ms")]
    Timeout {
        /// The evicted call.
        id: CorrelationId,
        /// The deadline that elapsed.
        timeout_ms: u64,
    },

    /// The completion was dropped without ever being answered.
    #[error("call dropped before a response arrived")]
    Dropped,

    /// A typed payload could not be serialized.
    #[error("failed to encode payload: {0}")]
    Encode(String),

    /// A successful result did not match the caller's expected type.
    #[error("failed to decode result: {0}")]
    Decode(String),
}

impl BridgeError {
    /// Build a host error, substituting the default message for `None`.
    pub fn host(error: Option<String>) -> Self {
        Self::Host(error.unwrap_or_else(|| DEFAULT_HOST_ERROR.to_owned()))
    }
}

/// Why an inbound frame was dropped.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The frame is not valid JSON, or a field has the wrong type.
    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is valid JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// The id is out of range for the envelope shape.
    #[error("invalid id {0} for envelope")]
    InvalidId(i64),
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
