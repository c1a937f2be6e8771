//! # dpp-settings
//!
//! Configuration for the DPP relay, loaded from three layers (in priority
//! order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: optional JSON file, deep-merged over defaults
//! 3. **Environment variables**: `PORT` and `DPP_*` overrides
//!
//! CLI flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path};
pub use types::*;
