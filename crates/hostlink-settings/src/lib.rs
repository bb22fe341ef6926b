//! # hostlink-settings
//!
//! Configuration with layered sources for hostlink bridges and the loopback
//! peer.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HostlinkSettings::default()`]
//! 2. **User file**: `~/.hostlink/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `HOSTLINK_*` overrides (highest priority)
//!
//! There is no global instance. Binaries load once and pass the value to
//! whatever they construct.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
