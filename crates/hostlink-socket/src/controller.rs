//! Reconnecting socket controller.
//!
//! One live socket at a time, retried forever at a fixed delay once started.
//! Every socket belongs to a generation; `connect` and `disconnect` bump the
//! generation, which detaches the previous socket so its close can no longer
//! publish notices or schedule a reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use hostlink_bridge::{Bridge, EventBus, Transport, Unlisten};
use hostlink_core::{BridgeError, Envelope, Result};
use hostlink_settings::SocketSettings;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use crate::config::SocketConfig;
use crate::notice::{ConnectionState, SocketChannel, SocketNotice};

/// Sender half feeding the current socket's write loop.
struct Link {
    generation: u64,
    outgoing: mpsc::UnboundedSender<Message>,
}

struct Inner {
    config: SocketConfig,
    state: watch::Sender<ConnectionState>,
    notices: EventBus<SocketChannel, SocketNotice>,
    link: Mutex<Option<Link>>,
    task: Mutex<Option<JoinHandle<()>>>,
    reconnect: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
    attempts: AtomicU64,
}

/// Reconnecting WebSocket client.
///
/// Cheap to clone; clones control the same socket. Must be used inside a
/// tokio runtime.
#[derive(Clone)]
pub struct SocketController {
    inner: Arc<Inner>,
}

impl SocketController {
    /// A controller in the `Closed` state. Nothing happens until
    /// [`start`](Self::start).
    pub fn new(config: SocketConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        Self {
            inner: Arc::new(Inner {
                config,
                state,
                notices: EventBus::new(),
                link: Mutex::new(None),
                task: Mutex::new(None),
                reconnect: Mutex::new(None),
                generation: AtomicU64::new(0),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    /// Build from loaded settings.
    pub fn from_settings(settings: &SocketSettings) -> Self {
        Self::new(SocketConfig::from_settings(settings))
    }

    /// Endpoint and delay in use.
    pub fn config(&self) -> &SocketConfig {
        &self.inner.config
    }

    /// Begin connecting and keep reconnecting until [`disconnect`](Self::disconnect).
    pub fn start(&self) {
        self.connect();
    }

    /// Replace the current socket with a fresh attempt.
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Stop for good: cancel any scheduled retry and close the socket
    /// without publishing a close notice.
    pub fn disconnect(&self) {
        self.inner.cancel_reconnect();
        let _ = self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if self.inner.link.lock().take().is_some() {
            debug!(url = %self.inner.config.url, "closing socket");
        }
        self.inner.set_state(ConnectionState::Closed);
    }

    /// [`disconnect`](Self::disconnect), then wait up to `grace` for frames
    /// already accepted to be flushed and the close frame sent.
    pub async fn close(&self, grace: Duration) {
        self.disconnect();
        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            if tokio::time::timeout(grace, task).await.is_err() {
                debug!(url = %self.inner.config.url, "socket did not close within grace period");
            }
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Observe state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Wait until the socket is open. Returns `false` on timeout.
    pub async fn wait_open(&self, timeout: Duration) -> bool {
        let mut state = self.subscribe_state();
        matches!(
            tokio::time::timeout(timeout, state.wait_for(|s| *s == ConnectionState::Open)).await,
            Ok(Ok(_))
        )
    }

    /// Connection attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Serialize `message` and send it.
    ///
    /// Returns `false` unless the socket is open. Nothing is queued for later.
    pub fn send_message<T: Serialize>(&self, message: &T) -> bool {
        match serde_json::to_string(message) {
            Ok(text) => self.send_text(&text),
            Err(e) => {
                warn!(error = %e, "failed to encode socket message");
                false
            }
        }
    }

    /// Send one text frame. Returns `false` unless the socket is open.
    pub fn send_text(&self, text: &str) -> bool {
        if self.state() != ConnectionState::Open {
            trace!(state = %self.state(), "socket not open, dropping frame");
            return false;
        }
        self.inner
            .link
            .lock()
            .as_ref()
            .is_some_and(|link| link.outgoing.send(Message::text(text)).is_ok())
    }

    /// Subscribe to one channel.
    pub fn listen<F>(&self, channel: SocketChannel, handler: F) -> Unlisten
    where
        F: Fn(&SocketNotice) + Send + Sync + 'static,
    {
        self.inner.notices.listen(channel, handler)
    }

    /// Subscribe to the next notice on one channel.
    pub fn listen_once<F>(&self, channel: SocketChannel, handler: F) -> Unlisten
    where
        F: Fn(&SocketNotice) + Send + Sync + 'static,
    {
        self.inner.notices.listen_once(channel, handler)
    }

    /// Route every inbound envelope into `bridge`.
    ///
    /// Holds the bridge weakly, so attaching a bridge that writes through this
    /// controller does not leak either of them.
    pub fn attach_bridge(&self, bridge: &Bridge) -> Unlisten {
        let weak = bridge.downgrade();
        self.listen(SocketChannel::Payload, move |notice| {
            let SocketNotice::Payload(envelope) = notice else {
                return;
            };
            if let Some(bridge) = weak.upgrade() {
                let outcome = bridge.handle_envelope(envelope.clone());
                trace!(?outcome, "socket payload handled");
            }
        })
    }

    /// A bridge writing through this controller and fed by its payloads.
    pub fn bridge(&self, default_timeout: Option<Duration>) -> Bridge {
        let bridge = Bridge::with_call_timeout(Arc::new(self.clone()), default_timeout);
        let _ = self.attach_bridge(&bridge);
        bridge
    }
}

impl Transport for SocketController {
    fn is_available(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    fn post(&self, frame: String) -> Result<()> {
        if self.send_text(&frame) {
            Ok(())
        } else {
            Err(BridgeError::TransportUnavailable)
        }
    }
}

impl std::fmt::Debug for SocketController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketController")
            .field("url", &self.inner.config.url)
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn set_state(&self, state: ConnectionState) {
        let _ = self.state.send_replace(state);
    }

    /// Set `state` only while `generation` is still the live socket. The
    /// check and the update happen under the watch lock, so a concurrent
    /// [`connect`](Self::connect) cannot be overwritten by a superseded socket.
    fn set_state_if_current(&self, generation: u64, state: ConnectionState) -> bool {
        self.state.send_if_modified(|current| {
            if !self.is_current(generation) {
                return false;
            }
            *current = state;
            true
        })
    }

    fn publish(&self, notice: SocketNotice) {
        let _ = self.notices.emit(&notice.channel(), &notice);
    }

    fn cancel_reconnect(&self) {
        if let Some(timer) = self.reconnect.lock().take() {
            timer.abort();
        }
    }

    fn connect(self: &Arc<Self>) {
        self.cancel_reconnect();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        // Dropping the previous sender makes its write loop close the socket.
        let (outgoing, rx) = mpsc::unbounded_channel();
        let previous = self.link.lock().replace(Link {
            generation,
            outgoing,
        });
        drop(previous);

        self.set_state(ConnectionState::Connecting);
        debug!(url = %self.config.url, attempt, "connecting");
        let task = tokio::spawn(run_socket(Arc::clone(self), generation, rx));
        drop(self.task.lock().replace(task));
    }

    /// Close of the socket belonging to `generation`.
    fn closed(self: &Arc<Self>, generation: u64) {
        if !self.set_state_if_current(generation, ConnectionState::Closed) {
            return;
        }
        {
            let mut link = self.link.lock();
            if link.as_ref().is_some_and(|l| l.generation == generation) {
                *link = None;
            }
        }

        let retry_in = self.config.reconnect_delay;
        info!(
            url = %self.config.url,
            retry_in_ms = u64::try_from(retry_in.as_millis()).unwrap_or(u64::MAX),
            "socket closed, reconnect scheduled"
        );
        self.publish(SocketNotice::Closed { retry_in });

        // The slot stays locked until the handle is stored, so the timer
        // cannot take it (or a newer timer replace it) before then.
        let mut slot = self.reconnect.lock();
        let inner = Arc::clone(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(retry_in).await;
            if inner.is_current(generation) {
                let _ = inner.reconnect.lock().take();
                inner.connect();
            }
        });
        if let Some(stale) = slot.replace(timer) {
            stale.abort();
        }
    }
}

async fn run_socket(
    inner: Arc<Inner>,
    generation: u64,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
) {
    let url = inner.config.url.clone();
    let mut ws = match connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            if inner.is_current(generation) {
                warn!(%url, error = %e, "connection failed");
                inner.publish(SocketNotice::Error(e.to_string()));
            }
            inner.closed(generation);
            return;
        }
    };

    if !inner.set_state_if_current(generation, ConnectionState::Open) {
        debug!(%url, "superseded while connecting, closing");
        let _ = ws.close(None).await;
        return;
    }

    info!(%url, "socket open");
    inner.publish(SocketNotice::Open);

    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            out = outgoing.recv() => {
                let Some(message) = out else {
                    // Sender dropped: replaced or disconnected.
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                if let Err(e) = sink.send(message).await {
                    if inner.is_current(generation) {
                        warn!(%url, error = %e, "socket write failed");
                        inner.publish(SocketNotice::Error(e.to_string()));
                    }
                    break;
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if inner.is_current(generation) {
                            deliver(&inner, text.as_str());
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        if inner.is_current(generation) {
                            warn!(%url, error = %e, "socket read failed");
                            inner.publish(SocketNotice::Error(e.to_string()));
                        }
                        break;
                    }
                }
            }
        }
    }

    inner.closed(generation);
}

fn deliver(inner: &Inner, text: &str) {
    match Envelope::parse(text) {
        Ok(envelope) => inner.publish(SocketNotice::Payload(envelope)),
        Err(e) => debug!(error = %e, "dropping unparsable socket frame"),
    }
}
