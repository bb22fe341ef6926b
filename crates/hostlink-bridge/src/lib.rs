//! # hostlink-bridge
//!
//! Correlated request/response and fire-and-forget messaging over a single
//! untyped text transport.
//!
//! - **Transport**: [`Transport`], the one outbound seam, plus the host-window
//!   adapter in [`host`]
//! - **Dispatcher**: id allocation and the pending-call table
//! - **Router**: inbound requests delivered to named handlers as [`Incoming`]
//! - **Events**: the generic [`EventBus`] both of the above build on
//! - **Bridge**: the [`Bridge`] object tying them to one transport

#![deny(unsafe_code)]

pub mod bridge;
pub mod dispatcher;
pub mod events;
pub mod host;
pub mod router;
pub mod testing;
pub mod transport;

pub use bridge::{Bridge, Inbound, WeakBridge};
pub use dispatcher::{CallFuture, Completion, Dispatcher};
pub use events::{EventBus, Handler, Unlisten};
pub use host::HostTransport;
pub use router::{Incoming, RequestBus, Routed};
pub use transport::{Detached, Transport};
