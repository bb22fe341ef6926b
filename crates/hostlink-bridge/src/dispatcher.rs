//! Outbound side: id allocation, request emission, and the pending table.
//!
//! Each call allocates a fresh id, records a completion under it, and posts
//! the request. A later response with the same id removes the entry and runs
//! the completion exactly once. Responses for unknown ids are ignored.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use hostlink_core::{BridgeError, CorrelationId, IdAllocator, Request, Response, Result};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::transport::Transport;

/// Completion run once with the outcome of a call.
pub type Completion = Box<dyn FnOnce(Result<Value>) + Send>;

/// Allocates ids and tracks calls awaiting a response.
pub struct Dispatcher {
    ids: IdAllocator,
    pending: Mutex<HashMap<CorrelationId, Completion>>,
}

impl Dispatcher {
    /// An empty dispatcher whose first id is 1.
    pub fn new() -> Self {
        Self {
            ids: IdAllocator::new(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Emit a call and register `completion` for its response.
    ///
    /// With the transport unavailable nothing is emitted, no id is consumed,
    /// the completion is failed immediately, and
    /// [`CorrelationId::UNAVAILABLE`] is returned. A `post` failure after
    /// allocation removes the pending entry and is reported the same way.
    pub fn invoke(
        &self,
        transport: &dyn Transport,
        event: &str,
        data: Value,
        completion: Option<Completion>,
    ) -> CorrelationId {
        if !transport.is_available() {
            debug!(event, "transport unavailable, call not sent");
            fail(completion, BridgeError::TransportUnavailable);
            return CorrelationId::UNAVAILABLE;
        }

        let id = self.ids.next_id();
        let frame = match Request::call(id, event, data).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                fail(completion, BridgeError::Encode(e.to_string()));
                return CorrelationId::UNAVAILABLE;
            }
        };

        // Registered before posting so a synchronous answer finds it.
        let tracked = completion.is_some();
        if let Some(completion) = completion {
            let _ = self.pending.lock().insert(id, completion);
        }

        if let Err(e) = transport.post(frame) {
            warn!(event, %id, error = %e, "post failed, call abandoned");
            let completion = self.pending.lock().remove(&id);
            fail(completion, e);
            return CorrelationId::UNAVAILABLE;
        }

        trace!(event, %id, tracked, "call sent");
        id
    }

    /// Emit a call and return a future resolving with its outcome.
    pub fn call(&self, transport: &dyn Transport, event: &str, data: Value) -> CallFuture {
        let (tx, rx) = oneshot::channel();
        let id = self.invoke(
            transport,
            event,
            data,
            Some(Box::new(move |result| {
                let _ = tx.send(result);
            })),
        );
        CallFuture { id, rx }
    }

    /// Emit a fire-and-forget request with id 0.
    ///
    /// Returns whether the transport accepted the frame.
    pub fn send(&self, transport: &dyn Transport, event: &str, data: Value) -> bool {
        if !transport.is_available() {
            debug!(event, "transport unavailable, event dropped");
            return false;
        }
        let frame = match Request::event(event, data).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event, error = %e, "failed to encode event");
                return false;
            }
        };
        transport.post(frame).is_ok()
    }

    /// Settle the call `response` answers.
    ///
    /// Returns `false` when no call with that id is pending.
    pub fn complete(&self, response: Response) -> bool {
        let Some(completion) = self.pending.lock().remove(&response.id) else {
            debug!(id = %response.id, "response for unknown call, ignoring");
            return false;
        };

        let outcome = if response.success {
            Ok(response.data)
        } else {
            Err(BridgeError::host(response.error))
        };
        completion(outcome);
        true
    }

    /// Drop the pending entry for `id` without running its completion.
    pub fn evict(&self, id: CorrelationId) -> bool {
        self.pending.lock().remove(&id).is_some()
    }

    /// Whether a call with `id` is awaiting its response.
    pub fn is_pending(&self, id: CorrelationId) -> bool {
        self.pending.lock().contains_key(&id)
    }

    /// Number of calls awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// The id the next call will receive.
    pub fn peek_next_id(&self) -> CorrelationId {
        self.ids.peek()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn fail(completion: Option<Completion>, error: BridgeError) {
    if let Some(completion) = completion {
        completion(Err(error));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CallFuture
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves with the outcome of one call.
///
/// The request is already on the wire when this is returned. Dropping the
/// future does not cancel the call: its pending entry stays until answered.
#[derive(Debug)]
#[must_use = "the call is already sent; await the future to observe its outcome"]
pub struct CallFuture {
    id: CorrelationId,
    rx: oneshot::Receiver<Result<Value>>,
}

impl CallFuture {
    /// A future that is already settled with `error`.
    pub fn failed(error: BridgeError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self {
            id: CorrelationId::UNAVAILABLE,
            rx,
        }
    }

    /// Id assigned to the call, or [`CorrelationId::UNAVAILABLE`].
    pub fn id(&self) -> CorrelationId {
        self.id
    }
}

impl Future for CallFuture {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(BridgeError::Dropped)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
