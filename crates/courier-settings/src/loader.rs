//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CourierSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::CourierSettings;

/// Resolve the default settings file path (`~/.courier/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".courier").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<CourierSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. A file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<CourierSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<CourierSettings> {
    let defaults = serde_json::to_value(CourierSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
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

/// Apply `COURIER_*` environment overrides.
///
/// Invalid values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut CourierSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
pub fn apply_overrides_from(
    settings: &mut CourierSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let parsed = |name: &str, parse: &dyn Fn(&str) -> bool| {
        let val = string(name)?;
        if parse(&val) {
            Some(val)
        } else {
            warn!(key = name, value = %val, "invalid env var, ignoring");
            None
        }
    };

    if let Some(v) = string("COURIER_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = parsed("COURIER_PORT", &|v: &str| parse_u16_range(v, 1, 65535).is_some()) {
        settings.server.port = v.parse().unwrap_or(settings.server.port);
    }
    if let Some(v) = string("COURIER_PUBLIC_WS_BASE") {
        settings.server.public_ws_base = Some(v);
    }
    if let Some(v) = string("COURIER_JWT_SECRET").or_else(|| string("APP_JWT_SECRET")) {
        settings.auth.jwt_secret = v;
    }
    if let Some(v) = string("COURIER_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = parsed("COURIER_LOG_JSON", &|v: &str| parse_bool(v).is_some()) {
        settings.logging.json = parse_bool(&v).unwrap_or(settings.logging.json);
    }

    let ms = |name: &str, min: u64, max: u64| {
        parsed(name, &|v: &str| parse_u64_range(v, min, max).is_some())
            .and_then(|v| parse_u64_range(&v, min, max))
    };
    if let Some(v) = ms("COURIER_KEEPALIVE_INTERVAL_MS", 1_000, 600_000) {
        settings.session.keepalive_interval_ms = v;
    }
    if let Some(v) = ms("COURIER_SEND_TIMEOUT_MS", 100, 60_000) {
        settings.session.send_timeout_ms = v;
    }
    if let Some(v) = ms("COURIER_IDLE_TTL_MS", 1_000, 7 * 24 * 3_600_000) {
        settings.session.idle_ttl_ms = v;
    }
}

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
