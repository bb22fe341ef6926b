//! Built-in request handlers installed on every connection's bridge.

use std::sync::Arc;

use hostlink_bridge::{Bridge, Incoming, Unlisten};
use hostlink_core::HostNotice;
use hostlink_settings::HostlinkSettings;
use serde_json::{Value, json};
use tracing::{info, warn};

/// Liveness probe.
pub const PING: &str = "Ping";
/// Effective settings as JSON.
pub const GET_APP_CONFIG: &str = "GetAppConfig";
/// Answers with the request data.
pub const ECHO: &str = "Echo";
/// Window commands from the UI.
pub const IPC_EVENT: &str = "[IpcEvent]";

/// Register the built-in handlers on `bridge`.
pub fn install(bridge: &Bridge, settings: &Arc<HostlinkSettings>) -> Vec<Unlisten> {
    let config = match serde_json::to_value(settings.as_ref()) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "failed to encode settings");
            Value::Null
        }
    };

    vec![
        bridge.listen(PING, |req: &Incoming| {
            let _ = req.respond(json!("pong"));
        }),
        bridge.listen(GET_APP_CONFIG, move |req: &Incoming| {
            let _ = req.respond(config.clone());
        }),
        bridge.listen(ECHO, |req: &Incoming| {
            let _ = req.respond(req.data().clone());
        }),
        bridge.listen(IPC_EVENT, |req: &Incoming| match req.decode::<HostNotice>() {
            Ok(HostNotice::IpcEvent(command)) => info!(?command, "window command"),
            Ok(other) => info!(?other, "notice"),
            Err(e) => warn!(error = %e, "unrecognized window command"),
        }),
    ]
}
