//! Typed catalogs of known event names.
//!
//! Each direction has a closed tagged union whose variants carry their own
//! payload type. The enums are adjacently tagged on `event`/`data`, the same
//! two fields a [`Request`](crate::Request) carries, so converting to the
//! string-keyed wire form is a plain serde round trip.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A closed set of event names with typed payloads.
pub trait Catalog: Serialize + DeserializeOwned {
    /// Split into the wire `(event, data)` pair.
    fn to_wire(&self) -> Result<(String, Value), serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        let data = value
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null);
        let event = value
            .get("event")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| {
                <serde_json::Error as serde::ser::Error>::custom("catalog entry has no event name")
            })?;
        Ok((event, data))
    }

    /// Rebuild from the wire `(event, data)` pair.
    ///
    /// Fails for names outside the catalog or payloads of the wrong shape.
    fn from_wire(event: &str, data: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json!({ "event": event, "data": data }))
    }
}

/// Calls the UI issues to the host and awaits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum HostCall {
    /// Fetch the host application's configuration.
    GetAppConfig,
    /// Hand a typed payload to the host's frontend handler.
    #[serde(rename = "frontend:payload|event")]
    FrontendPayload(FrontendPayload),
}

/// Fire-and-forget notifications from the UI to the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum HostNotice {
    /// A window command for the host's event loop.
    #[serde(rename = "[IpcEvent]")]
    IpcEvent(WindowCommand),
    /// A typed payload for the host's frontend handler, no answer expected.
    #[serde(rename = "frontend:payload|event")]
    FrontendPayload(FrontendPayload),
}

/// Calls the host issues to the UI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RemoteCall {
    /// Liveness probe, answered with `"pong"`.
    Ping,
    /// Ask the UI for its current form contents.
    #[serde(rename = "get-form-data")]
    GetFormData,
    /// Ask the UI to validate a value.
    #[serde(rename = "validate-data")]
    ValidateData(Value),
}

/// `{type, value}` payload routed to the host's frontend handler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrontendPayload {
    /// Handler discriminator.
    #[serde(rename = "type")]
    pub kind: String,
    /// Handler argument.
    #[serde(default)]
    pub value: Value,
}

/// Window commands understood by the host event loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum WindowCommand {
    /// Minimize the window.
    Minimize,
    /// Maximize the window.
    Maximize,
    /// Start a native window drag.
    DragWindow,
    /// Close the window.
    CloseWindow,
    /// Launch a plugin by name.
    LaunchPlugin(String),
    /// Load a URL into the window's surface.
    LoadUrl(String),
    /// Navigate the embedded web view.
    NavigateWebview(String),
    /// Set the web view zoom factor.
    ZoomWebview(f32),
    /// Pin or unpin the window above others.
    SetWindowOnTop(bool),
    /// Show or hide native decorations.
    SetWindowDecorated(bool),
    /// Show or hide the window shadow.
    SetWindowShadow(bool),
    /// Let mouse events pass through the window.
    SetIgnoreCursorEvent(bool),
}

impl Catalog for HostCall {}
impl Catalog for HostNotice {}
impl Catalog for RemoteCall {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_variant_has_null_data() {
        let (event, data) = HostCall::GetAppConfig.to_wire().unwrap();
        assert_eq!(event, "GetAppConfig");
        assert!(data.is_null());
    }

    #[test]
    fn renamed_variant_uses_wire_name() {
        let notice = HostNotice::IpcEvent(WindowCommand::SetWindowOnTop(true));
        let (event, data) = notice.to_wire().unwrap();
        assert_eq!(event, "[IpcEvent]");
        assert_eq!(data, json!({"type": "SetWindowOnTop", "value": true}));
    }

    #[test]
    fn frontend_payload_shape() {
        let call = HostCall::FrontendPayload(FrontendPayload {
            kind: "FunctionCall".into(),
            value: json!({"func": "getLayer", "args": ["layer1"]}),
        });
        let (event, data) = call.to_wire().unwrap();
        assert_eq!(event, "frontend:payload|event");
        assert_eq!(data["type"], "FunctionCall");
        assert_eq!(data["value"]["func"], "getLayer");
    }

    #[test]
    fn from_wire_unit_variant_with_null_data() {
        let call = RemoteCall::from_wire("Ping", Value::Null).unwrap();
        assert_eq!(call, RemoteCall::Ping);
    }

    #[test]
    fn from_wire_newtype_variant() {
        let call = RemoteCall::from_wire("validate-data", json!({"email": "a@b"})).unwrap();
        assert_eq!(call, RemoteCall::ValidateData(json!({"email": "a@b"})));
    }

    #[test]
    fn from_wire_unknown_name_fails() {
        assert!(RemoteCall::from_wire("NoSuchCall", Value::Null).is_err());
    }

    #[test]
    fn window_command_unit_variant() {
        let (_, data) = HostNotice::IpcEvent(WindowCommand::DragWindow)
            .to_wire()
            .unwrap();
        assert_eq!(data, json!({"type": "DragWindow"}));
    }
}
