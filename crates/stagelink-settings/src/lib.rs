//! # stagelink-settings
//!
//! Layered configuration for the messaging host.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`StageLinkSettings::default()`]
//! 2. **Settings file**: JSON, merged section by section over defaults
//! 3. **Environment variables**: `STAGELINK_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, load_settings_from_path, merge_into, validate,
};
pub use types::*;
