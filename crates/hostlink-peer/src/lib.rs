//! # hostlink-peer
//!
//! The local control process a reconnecting socket client talks to.
//!
//! Accepts WebSocket connections on a loopback address and runs one
//! [`Bridge`](hostlink_bridge::Bridge) per connection, with the built-in
//! handlers from [`handlers`] installed. The server can push events to every
//! connection and issue its own calls through a connection's bridge.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod handlers;
pub mod registry;
pub mod server;

pub use connection::PeerConnection;
pub use errors::{PeerError, Result};
pub use registry::ConnectionRegistry;
pub use server::PeerServer;
