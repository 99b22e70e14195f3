//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CalwatchSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `CALWATCH_*` environment overrides (highest priority)
//! 4. Validate

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use calwatch_engine::WindowPolicy;

use crate::errors::{Result, SettingsError};
use crate::types::CalwatchSettings;

/// `~/.calwatch/settings.json`
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".calwatch").join("settings.json")
}

pub fn load_settings() -> Result<CalwatchSettings> {
    load_settings_from_path(&settings_path())
}

/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<CalwatchSettings> {
    let mut settings = read_file_layer(path)?;
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    validate(&settings)?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<CalwatchSettings> {
    let defaults = serde_json::to_value(CalwatchSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key, arrays and primitives are replaced, and nulls in
/// `source` leave `target` untouched.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CALWATCH_*` overrides read through `lookup`.
///
/// Empty values are treated as unset. Unparseable values are ignored with a
/// warning and the file/default value stays.
pub fn apply_overrides(settings: &mut CalwatchSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = read("CALWATCH_WINDOW_CAPACITY") {
        match parse_usize_range(&v, 1, 1_000) {
            Some(n) => settings.window.capacity = n,
            None => invalid("CALWATCH_WINDOW_CAPACITY", &v),
        }
    }
    if let Some(v) = read("CALWATCH_WINDOW_POLICY") {
        match parse_policy(&v) {
            Some(p) => settings.window.policy = p,
            None => invalid("CALWATCH_WINDOW_POLICY", &v),
        }
    }

    if let Some(v) = read("CALWATCH_API_BASE") {
        settings.extraction.base_url = v;
    }
    if let Some(v) = read("CALWATCH_MODEL") {
        settings.extraction.model = v;
    }
    if let Some(v) = read("CALWATCH_TIMEOUT_MS") {
        match parse_u64_range(&v, 1, 600_000) {
            Some(n) => settings.extraction.timeout_ms = n,
            None => invalid("CALWATCH_TIMEOUT_MS", &v),
        }
    }

    if let Some(v) = read("CALWATCH_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("CALWATCH_PORT") {
        match parse_u16_range(&v, 0, u16::MAX) {
            Some(n) => settings.server.port = n,
            None => invalid("CALWATCH_PORT", &v),
        }
    }

    if let Some(v) = read("CALWATCH_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("CALWATCH_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => settings.logging.json = b,
            None => invalid("CALWATCH_LOG_JSON", &v),
        }
    }
}

fn invalid(key: &str, value: &str) {
    warn!(key, value, "invalid env override, ignoring");
}

/// Reject settings the service cannot run with.
pub fn validate(settings: &CalwatchSettings) -> Result<()> {
    if settings.window.capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "window.capacity must be at least 1".into(),
        ));
    }
    if settings.extraction.timeout_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "extraction.timeoutMs must be positive".into(),
        ));
    }
    if settings.extraction.base_url.trim().is_empty() {
        return Err(SettingsError::InvalidValue(
            "extraction.baseUrl must not be empty".into(),
        ));
    }
    Ok(())
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_policy(val: &str) -> Option<WindowPolicy> {
    serde_json::from_value(Value::String(val.trim().to_lowercase())).ok()
}
