//! Connection states and the notices the controller publishes.

use std::fmt;
use std::time::Duration;

use hostlink_core::Envelope;

/// Lifecycle of the single live socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// An attempt is in flight.
    Connecting,
    /// The socket is open and frames can be sent.
    Open,
    /// No socket. A reconnect may be scheduled.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        })
    }
}

/// Channels a listener can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SocketChannel {
    /// The socket opened.
    Open,
    /// Errors and closes.
    Error,
    /// Parsed inbound envelopes.
    Payload,
}

/// What the controller publishes on its channels.
#[derive(Clone, Debug, PartialEq)]
pub enum SocketNotice {
    /// Published on [`SocketChannel::Open`].
    Open,
    /// A transport error, published on [`SocketChannel::Error`].
    Error(String),
    /// The socket closed and a reconnect is scheduled, published on
    /// [`SocketChannel::Error`].
    Closed {
        /// Delay before the next attempt.
        retry_in: Duration,
    },
    /// An inbound envelope, published on [`SocketChannel::Payload`].
    Payload(Envelope),
}

impl SocketNotice {
    /// The channel this notice is published on.
    pub fn channel(&self) -> SocketChannel {
        match self {
            Self::Open => SocketChannel::Open,
            Self::Error(_) | Self::Closed { .. } => SocketChannel::Error,
            Self::Payload(_) => SocketChannel::Payload,
        }
    }
}

impl fmt::Display for SocketNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("connected"),
            Self::Error(message) => write!(f, "socket error: {message}"),
            Self::Closed { retry_in } => {
                write!(f, "connection closed, reconnect in {}s", retry_in.as_secs_f64())
            }
            Self::Payload(envelope) => write!(f, "payload {}", envelope.id()),
        }
    }
}
