//! The bridge object: one transport, one id space, one handler registry.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use hostlink_core::{
    BridgeError, Catalog, CorrelationId, Envelope, Request, Response, Result,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::dispatcher::{CallFuture, Dispatcher};
use crate::events::Unlisten;
use crate::router::{self, Incoming, RequestBus, Routed};
use crate::transport::Transport;

/// What the receive path did with one inbound frame.
///
/// Every variant other than `Resolved`, `Routed`, and `Event` is a silent
/// drop: nothing is surfaced to any caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// A response settled the pending call with this id.
    Resolved(CorrelationId),
    /// A response arrived for an id that is not pending.
    Unmatched(CorrelationId),
    /// A call was delivered to `handlers` handlers.
    Routed {
        /// Request id.
        id: CorrelationId,
        /// Handlers invoked.
        handlers: usize,
    },
    /// A call arrived for a name with no handler; no response is sent.
    Unhandled(CorrelationId),
    /// An id-0 event was delivered to `handlers` handlers (possibly zero).
    Event {
        /// Handlers invoked.
        handlers: usize,
    },
    /// The frame did not parse as the expected envelope.
    Malformed,
}

struct Inner {
    transport: Arc<dyn Transport>,
    dispatcher: Dispatcher,
    handlers: RequestBus,
    default_timeout: Option<Duration>,
}

/// Correlated call/event bridge over a single [`Transport`].
///
/// Cloning is cheap and every clone shares the same pending table and
/// handler registry.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

impl Bridge {
    /// A bridge without a default call deadline.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_call_timeout(transport, None)
    }

    /// A bridge whose [`call_with_default_timeout`](Self::call_with_default_timeout)
    /// uses `default_timeout`.
    pub fn with_call_timeout(
        transport: Arc<dyn Transport>,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                dispatcher: Dispatcher::new(),
                handlers: RequestBus::new(),
                default_timeout,
            }),
        }
    }

    /// A handle that does not keep the bridge alive.
    pub fn downgrade(&self) -> WeakBridge {
        WeakBridge {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// Whether outbound frames can currently be posted.
    pub fn is_available(&self) -> bool {
        self.inner.transport.is_available()
    }

    /// Configured default deadline.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.inner.default_timeout
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Emit a call whose response is not tracked.
    pub fn invoke(&self, event: &str, data: Value) -> CorrelationId {
        self.inner
            .dispatcher
            .invoke(self.inner.transport.as_ref(), event, data, None)
    }

    /// Emit a call and run `callback` once with its outcome.
    ///
    /// Returns [`CorrelationId::UNAVAILABLE`] and runs `callback` before
    /// returning when nothing could be posted.
    pub fn invoke_with<F>(&self, event: &str, data: Value, callback: F) -> CorrelationId
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        self.inner.dispatcher.invoke(
            self.inner.transport.as_ref(),
            event,
            data,
            Some(Box::new(callback)),
        )
    }

    /// Emit a call and return a future resolving with its outcome.
    pub fn call(&self, event: &str, data: Value) -> CallFuture {
        self.inner
            .dispatcher
            .call(self.inner.transport.as_ref(), event, data)
    }

    /// Like [`call`](Self::call), decoding the result into `T`.
    pub fn call_as<T>(
        &self,
        event: &str,
        data: Value,
    ) -> impl Future<Output = Result<T>> + Send + use<T>
    where
        T: DeserializeOwned,
    {
        let call = self.call(event, data);
        async move {
            let value = call.await?;
            serde_json::from_value(value).map_err(|e| BridgeError::Decode(e.to_string()))
        }
    }

    /// Like [`call`](Self::call), giving up after `timeout`.
    ///
    /// The deadline counts from now, not from the first poll. On expiry the
    /// pending entry is evicted, so a late response is unmatched.
    pub fn call_with_timeout(
        &self,
        event: &str,
        data: Value,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value>> + Send + use<> {
        self.call_with_deadline(event, data, Some(timeout))
    }

    /// [`call_with_timeout`](Self::call_with_timeout) with the configured
    /// default, or a plain [`call`](Self::call) when none is set.
    pub fn call_with_default_timeout(
        &self,
        event: &str,
        data: Value,
    ) -> impl Future<Output = Result<Value>> + Send + use<> {
        self.call_with_deadline(event, data, self.inner.default_timeout)
    }

    fn call_with_deadline(
        &self,
        event: &str,
        data: Value,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<Value>> + Send + use<> {
        let deadline = timeout.map(|t| (Instant::now() + t, t));
        let call = self.call(event, data);
        let inner = Arc::clone(&self.inner);
        let event = event.to_owned();

        async move {
            let Some((deadline, timeout)) = deadline else {
                return call.await;
            };
            let id = call.id();
            if let Ok(outcome) = tokio::time::timeout_at(deadline, call).await {
                outcome
            } else {
                let _ = inner.dispatcher.evict(id);
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(event = %event, %id, timeout_ms, "call timed out, evicted");
                Err(BridgeError::Timeout { id, timeout_ms })
            }
        }
    }

    /// Emit a typed catalog call.
    pub fn call_typed<C: Catalog>(&self, call: &C) -> CallFuture {
        match call.to_wire() {
            Ok((event, data)) => self.call(&event, data),
            Err(e) => CallFuture::failed(BridgeError::Encode(e.to_string())),
        }
    }

    /// Emit a fire-and-forget event. Returns whether it was posted.
    pub fn send(&self, event: &str, data: Value) -> bool {
        self.inner
            .dispatcher
            .send(self.inner.transport.as_ref(), event, data)
    }

    /// Emit a typed catalog entry as a fire-and-forget event.
    pub fn notify<C: Catalog>(&self, notice: &C) -> bool {
        match notice.to_wire() {
            Ok((event, data)) => self.send(&event, data),
            Err(e) => {
                warn!(error = %e, "failed to encode notice");
                false
            }
        }
    }

    /// Calls still awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.dispatcher.pending_count()
    }

    /// Whether the call `id` is awaiting a response.
    pub fn is_pending(&self, id: CorrelationId) -> bool {
        self.inner.dispatcher.is_pending(id)
    }

    // ── Handlers ────────────────────────────────────────────────────

    /// Handle every request named `event`, calls and events alike.
    pub fn listen<F>(&self, event: &str, handler: F) -> Unlisten
    where
        F: Fn(&Incoming) + Send + Sync + 'static,
    {
        self.inner.handlers.listen(event, handler)
    }

    /// Handle the next request named `event` only.
    pub fn listen_once<F>(&self, event: &str, handler: F) -> Unlisten
    where
        F: Fn(&Incoming) + Send + Sync + 'static,
    {
        self.inner.handlers.listen_once(event, handler)
    }

    /// Live handlers for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.handlers.listener_count(event)
    }

    // ── Inbound ─────────────────────────────────────────────────────

    /// Classify and handle one inbound frame of either shape.
    pub fn receive(&self, frame: &str) -> Inbound {
        match Envelope::parse(frame) {
            Ok(envelope) => self.handle_envelope(envelope),
            Err(e) => {
                debug!(error = %e, "dropping malformed frame");
                Inbound::Malformed
            }
        }
    }

    /// Handle an already parsed envelope.
    pub fn handle_envelope(&self, envelope: Envelope) -> Inbound {
        match envelope {
            Envelope::Request(request) => self.handle_request(request),
            Envelope::Response(response) => self.handle_response(response),
        }
    }

    /// Host entry point for inbound requests.
    pub fn handle_request_frame(&self, frame: &str) -> Inbound {
        match Envelope::parse(frame) {
            Ok(Envelope::Request(request)) => self.handle_request(request),
            Ok(Envelope::Response(_)) => {
                debug!("response delivered to the request entry point, dropping");
                Inbound::Malformed
            }
            Err(e) => {
                debug!(error = %e, "dropping malformed request frame");
                Inbound::Malformed
            }
        }
    }

    /// Host entry point for inbound responses.
    pub fn handle_response_frame(&self, frame: &str) -> Inbound {
        match Envelope::parse(frame) {
            Ok(Envelope::Response(response)) => self.handle_response(response),
            Ok(Envelope::Request(_)) => {
                debug!("request delivered to the response entry point, dropping");
                Inbound::Malformed
            }
            Err(e) => {
                debug!(error = %e, "dropping malformed response frame");
                Inbound::Malformed
            }
        }
    }

    /// Route a request to its handlers.
    pub fn handle_request(&self, request: Request) -> Inbound {
        let id = request.id;
        let is_event = request.is_event();
        match router::route(&self.inner.handlers, &self.inner.transport, request) {
            Routed::Delivered(handlers) if is_event => Inbound::Event { handlers },
            Routed::Unhandled if is_event => Inbound::Event { handlers: 0 },
            Routed::Delivered(handlers) => Inbound::Routed { id, handlers },
            Routed::Unhandled => Inbound::Unhandled(id),
        }
    }

    /// Settle the pending call `response` answers.
    pub fn handle_response(&self, response: Response) -> Inbound {
        let id = response.id;
        if self.inner.dispatcher.complete(response) {
            Inbound::Resolved(id)
        } else {
            Inbound::Unmatched(id)
        }
    }
}

/// Non-owning [`Bridge`] handle for callbacks the bridge's transport owns.
#[derive(Clone, Debug)]
pub struct WeakBridge {
    inner: Weak<Inner>,
}

impl WeakBridge {
    /// The bridge, if any clone of it is still alive.
    pub fn upgrade(&self) -> Option<Bridge> {
        self.inner.upgrade().map(|inner| Bridge { inner })
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("available", &self.is_available())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
