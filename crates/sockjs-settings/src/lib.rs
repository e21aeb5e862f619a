//! # sockjs-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`SockJsSettings::default()`]
//! 2. **User file**: `~/.sockjs/settings.json` or an explicit path (deep-merged over defaults)
//! 3. **Environment variables**: `SOCKJS_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_overrides, clamp_sockjs, deep_merge, load_file_layer, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::{LoggingSettings, ServerSettings, SockJsSettings};
