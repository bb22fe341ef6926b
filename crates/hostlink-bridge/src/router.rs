//! Inbound side: requests from the peer delivered to named handlers.
//!
//! Handlers receive an [`Incoming`] notification. For calls it carries a
//! responder that emits exactly one response with the request's id; the first
//! of `respond` or `error` wins and every later attempt is a no-op returning
//! `false`. Events (id 0) carry no responder.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hostlink_core::{Catalog, CorrelationId, Request, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::events::EventBus;
use crate::transport::Transport;

/// Registry of request handlers keyed by event name.
pub type RequestBus = EventBus<String, Incoming>;

struct Responder {
    transport: Arc<dyn Transport>,
    answered: AtomicBool,
}

/// A request delivered to handlers.
///
/// Cheap to clone, so a handler can move a copy into a task and answer later.
#[derive(Clone)]
pub struct Incoming {
    id: CorrelationId,
    event: String,
    data: Value,
    responder: Option<Arc<Responder>>,
}

impl Incoming {
    /// Wrap `request`, attaching a responder when it expects an answer.
    pub fn new(request: Request, transport: Arc<dyn Transport>) -> Self {
        let responder = request.id.is_call().then(|| {
            Arc::new(Responder {
                transport,
                answered: AtomicBool::new(false),
            })
        });
        Self {
            id: request.id,
            event: request.event,
            data: request.data,
            responder,
        }
    }

    /// Request id, `0` for events.
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// Event name.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Payload.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Whether the sender is waiting for a response.
    pub fn expects_reply(&self) -> bool {
        self.responder.is_some()
    }

    /// Whether a response has already been emitted.
    pub fn is_answered(&self) -> bool {
        self.responder
            .as_ref()
            .is_some_and(|r| r.answered.load(Ordering::SeqCst))
    }

    /// Decode into a typed catalog entry.
    pub fn decode<C: Catalog>(&self) -> Result<C, serde_json::Error> {
        C::from_wire(&self.event, self.data.clone())
    }

    /// Answer with a success payload.
    pub fn respond(&self, data: Value) -> bool {
        self.answer(Response::success(self.id, data))
    }

    /// Answer with any serializable payload.
    ///
    /// A payload that fails to serialize is answered as an error instead.
    pub fn respond_with<T: Serialize>(&self, data: &T) -> bool {
        match serde_json::to_value(data) {
            Ok(value) => self.respond(value),
            Err(e) => self.error(format!("failed to encode result: {e}")),
        }
    }

    /// Answer with a failure reason.
    pub fn error(&self, message: impl Into<String>) -> bool {
        self.answer(Response::failure(self.id, message))
    }

    fn answer(&self, response: Response) -> bool {
        let Some(responder) = &self.responder else {
            debug!(event = %self.event, "answer to an event, ignoring");
            return false;
        };
        if responder.answered.swap(true, Ordering::SeqCst) {
            debug!(id = %self.id, event = %self.event, "already answered, ignoring");
            return false;
        }

        let frame = match response.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(id = %self.id, error = %e, "failed to encode response");
                return false;
            }
        };
        match responder.transport.post(frame) {
            Ok(()) => true,
            Err(e) => {
                warn!(id = %self.id, event = %self.event, error = %e, "response not delivered");
                false
            }
        }
    }
}

impl fmt::Debug for Incoming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Incoming")
            .field("id", &self.id)
            .field("event", &self.event)
            .field("data", &self.data)
            .field("expects_reply", &self.expects_reply())
            .finish()
    }
}

/// What happened to a routed request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Routed {
    /// Delivered to this many handlers.
    Delivered(usize),
    /// No handler is registered for the event name.
    Unhandled,
}

/// Deliver `request` to every handler registered under its event name.
///
/// Unhandled calls get no response; the caller keeps waiting.
pub fn route(bus: &RequestBus, transport: &Arc<dyn Transport>, request: Request) -> Routed {
    let event = request.event.clone();
    let incoming = Incoming::new(request, Arc::clone(transport));
    match bus.emit(event.as_str(), &incoming) {
        0 => {
            debug!(event = %event, id = %incoming.id, "no handler registered, dropping");
            Routed::Unhandled
        }
        n => Routed::Delivered(n),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
