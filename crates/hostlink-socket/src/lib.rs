//! # hostlink-socket
//!
//! Reconnecting WebSocket client for the local control process.
//!
//! [`SocketController`] keeps one socket open to a fixed endpoint, retrying
//! at a fixed delay after every close until explicitly disconnected. Inbound
//! text frames are parsed into envelopes and published on
//! [`SocketChannel::Payload`]; the controller also implements the bridge
//! [`Transport`](hostlink_bridge::Transport), so a [`Bridge`](hostlink_bridge::Bridge)
//! can run over it.

#![deny(unsafe_code)]

pub mod config;
pub mod controller;
pub mod notice;

pub use config::SocketConfig;
pub use controller::SocketController;
pub use notice::{ConnectionState, SocketChannel, SocketNotice};
