//! Layered configuration for calwatch.
//!
//! Settings come from three layers, in priority order:
//! 1. Compiled defaults ([`CalwatchSettings::default()`])
//! 2. `~/.calwatch/settings.json`, deep-merged over the defaults
//! 3. `CALWATCH_*` environment variables
//!
//! Secrets never live here. The extraction API key is read from
//! `CALWATCH_API_KEY` at bootstrap.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_overrides, deep_merge, load_settings, load_settings_from_path, settings_path, validate,
};
pub use types::{CalwatchSettings, ExtractionSettings, LoggingSettings, ServerSettings, WindowSettings};
