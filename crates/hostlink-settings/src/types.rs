//! Settings types with compiled defaults.

use serde::{Deserialize, Serialize};

/// Default endpoint of the local control process.
pub const DEFAULT_SOCKET_URL: &str = "ws://127.0.0.1:1818";
/// Default fixed delay between a close and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostlinkSettings {
    /// Reconnecting socket client.
    pub socket: SocketSettings,
    /// Outbound call behavior.
    pub calls: CallSettings,
    /// Loopback peer server.
    pub peer: PeerSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Reconnecting socket client settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SocketSettings {
    /// Endpoint URL, always a loopback `ws://` address in practice.
    pub url: String,
    /// Fixed delay before reconnecting after a close, in milliseconds.
    pub reconnect_delay_ms: u64,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOCKET_URL.to_string(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

/// Outbound call settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallSettings {
    /// Optional per-call deadline. `None` keeps calls pending until answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Loopback peer server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1818,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}
