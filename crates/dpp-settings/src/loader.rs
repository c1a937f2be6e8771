//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use dpp_core::LogFormat;
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::RelaySettings;

/// Load settings, optionally from a file, then apply environment overrides.
pub fn load_settings(path: Option<&Path>) -> Result<RelaySettings> {
    let mut settings = match path {
        Some(p) => load_settings_from_path(p)?,
        None => RelaySettings::default(),
    };
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Load settings from a JSON file deep-merged over defaults.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

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
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Invalid values are logged and ignored (fall back to file/default).
pub fn apply_overrides_from(
    settings: &mut RelaySettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("PORT") {
        match parse_u16_range(&v, 1, 65535) {
            Some(port) => settings.server.port = port,
            None => invalid("PORT", &v),
        }
    }
    if let Some(v) = read("DPP_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("DPP_RPC_URL") {
        settings.ledger.rpc_url = v;
    }
    if let Some(v) = read("DPP_CONTRACT_ADDRESS") {
        settings.ledger.contract_address = v;
    }
    if let Some(v) = read("DPP_POLL_INTERVAL_MS") {
        match parse_u64_range(&v, 100, 3_600_000) {
            Some(ms) => settings.poller.poll_interval_ms = ms,
            None => invalid("DPP_POLL_INTERVAL_MS", &v),
        }
    }
    if let Some(v) = read("DPP_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("DPP_LOG_FORMAT") {
        match LogFormat::parse(&v) {
            Some(format) => settings.logging.format = format,
            None => invalid("DPP_LOG_FORMAT", &v),
        }
    }
    if let Some(v) = read("DPP_INCLUDE_EVENT_DETAILS") {
        match parse_bool(&v) {
            Some(b) => settings.server.include_event_details = b,
            None => invalid("DPP_INCLUDE_EVENT_DETAILS", &v),
        }
    }
}

fn invalid(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid env var, ignoring");
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
