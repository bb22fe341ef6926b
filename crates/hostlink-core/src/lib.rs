//! # hostlink-core
//!
//! Foundation types shared by every hostlink crate:
//!
//! - **Envelopes**: [`Request`] and [`Response`], the only two shapes that
//!   cross the wire, plus [`Envelope::parse`] for inbound classification
//! - **Correlation ids**: [`CorrelationId`] with the reserved `0` (event) and
//!   `-1` (transport unavailable) values, and the per-bridge [`IdAllocator`]
//! - **Catalogs**: closed tagged unions of known event names per direction
//! - **Errors**: [`BridgeError`] and [`ParseError`] via `thiserror`
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod catalog;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod logging;

pub use catalog::{Catalog, FrontendPayload, HostCall, HostNotice, RemoteCall, WindowCommand};
pub use envelope::{Envelope, Request, Response};
pub use errors::{BridgeError, ParseError, Result};
pub use ids::{CorrelationId, IdAllocator};
