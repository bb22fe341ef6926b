//! Controller configuration.

use std::time::Duration;

use hostlink_settings::{DEFAULT_RECONNECT_DELAY_MS, DEFAULT_SOCKET_URL, SocketSettings};

/// Endpoint and retry delay for a [`SocketController`](crate::SocketController).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketConfig {
    /// WebSocket endpoint.
    pub url: String,
    /// Fixed delay between a close and the next attempt.
    pub reconnect_delay: Duration,
}

impl SocketConfig {
    /// Config for `url` with the default delay.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
        }
    }

    /// Override the reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Build from loaded settings.
    pub fn from_settings(settings: &SocketSettings) -> Self {
        Self::new(settings.url.clone())
            .with_reconnect_delay(Duration::from_millis(settings.reconnect_delay_ms))
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SOCKET_URL)
    }
}
