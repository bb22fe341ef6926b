//! Host-window transport.
//!
//! The embedding host exposes a string-posting primitive (a web view's
//! `postMessage`, an IPC pipe) that may or may not be installed. Delivery in
//! the other direction goes through the bridge's
//! [`handle_request_frame`](crate::Bridge::handle_request_frame) and
//! [`handle_response_frame`](crate::Bridge::handle_response_frame) entry
//! points. A host written in Rust that drives a script-based UI can use
//! [`script`] to render those deliveries as evaluable snippets.

use std::fmt;
use std::sync::Arc;

use hostlink_core::{BridgeError, Result};
use parking_lot::RwLock;

use crate::transport::Transport;

type PostFn = Arc<dyn Fn(String) + Send + Sync>;

/// [`Transport`] over an optionally installed post primitive.
#[derive(Default)]
pub struct HostTransport {
    post: RwLock<Option<PostFn>>,
}

impl HostTransport {
    /// A transport with `post` installed.
    pub fn new(post: impl Fn(String) + Send + Sync + 'static) -> Self {
        Self {
            post: RwLock::new(Some(Arc::new(post))),
        }
    }

    /// A transport with nothing installed yet.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Install or replace the post primitive.
    pub fn attach(&self, post: impl Fn(String) + Send + Sync + 'static) {
        *self.post.write() = Some(Arc::new(post));
    }

    /// Remove the post primitive.
    pub fn detach(&self) {
        *self.post.write() = None;
    }
}

impl Transport for HostTransport {
    fn is_available(&self) -> bool {
        self.post.read().is_some()
    }

    fn post(&self, frame: String) -> Result<()> {
        // Cloned out so a re-entrant post never runs under the lock.
        let post = self.post.read().clone();
        match post {
            Some(post) => {
                post(frame);
                Ok(())
            }
            None => Err(BridgeError::TransportUnavailable),
        }
    }
}

impl fmt::Debug for HostTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostTransport")
            .field("attached", &self.is_available())
            .finish()
    }
}

/// Snippets a host evaluates in a script UI to deliver envelopes.
pub mod script {
    use hostlink_core::{Request, Response};
    use serde_json::Value;

    /// Global the UI installs to receive requests.
    pub const REQUEST_HANDLER: &str = "__ipc_handler";
    /// Global the UI installs to receive responses.
    pub const RESPONSE_HANDLER: &str = "__ipc_response_handler";

    fn invoke_global(global: &str, payload: &str) -> String {
        format!(
            "(function(){{const message={payload};if(window.{global}){{window.{global}(message);}}}})();"
        )
    }

    /// Deliver a request to the UI's request entry point.
    pub fn request(request: &Request) -> Result<String, serde_json::Error> {
        Ok(invoke_global(REQUEST_HANDLER, &request.to_frame()?))
    }

    /// Deliver a response to the UI's response entry point.
    pub fn response(response: &Response) -> Result<String, serde_json::Error> {
        Ok(invoke_global(RESPONSE_HANDLER, &response.to_frame()?))
    }

    /// Dispatch a DOM `CustomEvent` named `event` with `detail` attached.
    pub fn dom_event(event: &str, detail: &Value) -> Result<String, serde_json::Error> {
        let name = serde_json::to_string(event)?;
        let detail = serde_json::to_string(detail)?;
        Ok(format!(
            "window.dispatchEvent(new CustomEvent({name},{{detail:{detail}}}));"
        ))
    }
}
