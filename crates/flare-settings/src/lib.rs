//! # flare-settings
//!
//! Layered configuration for the Flare server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`FlareSettings::default()`]
//! 2. **User file**: `~/.flare/settings.json` or an explicit path, deep-merged
//!    over the defaults
//! 3. **Environment variables**: `FLARE_*` overrides
//!
//! The loaded value is passed explicitly to the server; there is no global.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path,
};
pub use types::{FlareSettings, LoggingSettings, PubSubSettings, ServerSettings, SessionSettings};
