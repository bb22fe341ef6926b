//! Peer server errors.

use thiserror::Error;

/// Errors from binding or serving.
#[derive(Debug, Error)]
pub enum PeerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was tried.
        addr: String,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// Any other socket failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// WebSocket handshake or framing failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Result alias for peer operations.
pub type Result<T> = std::result::Result<T, PeerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_names_address() {
        let err = PeerError::Bind {
            addr: "127.0.0.1:1818".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:1818: in use");
    }

    #[test]
    fn io_error_is_transparent() {
        let err: PeerError = std::io::Error::other("boom").into();
        assert_eq!(err.to_string(), "boom");
    }
}
