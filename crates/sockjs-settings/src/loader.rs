//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SockJsSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `SOCKJS_*` environment variable overrides
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use sockjs_core::SockJsOptions;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::SockJsSettings;

/// Accepted range for session timeout and heartbeat period, in milliseconds.
pub const DURATION_MS_RANGE: (u64, u64) = (1, 86_400_000);
/// Accepted range for the streaming byte budget.
pub const MAX_BYTES_RANGE: (u64, u64) = (1, 1 << 30);

/// Resolve the default settings path (`~/.sockjs/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".sockjs").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SockJsSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields the defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<SockJsSettings> {
    let mut settings = load_file_layer(path)?;
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

/// Defaults deep-merged with the file at `path`, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<SockJsSettings> {
    let defaults = serde_json::to_value(SockJsSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SockJsSettings = serde_json::from_value(merged)?;
    clamp_sockjs(&mut settings.sockjs);
    Ok(settings)
}

/// Reset out-of-range session options to their defaults.
///
/// A zero heartbeat period would spin the heartbeat timer and a zero byte
/// budget would recycle every streaming response before its first frame.
pub fn clamp_sockjs(options: &mut SockJsOptions) {
    let defaults = SockJsOptions::default();
    let in_range = |v: u64, (min, max): (u64, u64)| v >= min && v <= max;

    if !in_range(options.session_timeout_ms, DURATION_MS_RANGE) {
        warn!(
            key = "session_timeout_ms",
            value = options.session_timeout_ms,
            "out of range, using default"
        );
        options.session_timeout_ms = defaults.session_timeout_ms;
    }
    if !in_range(options.heartbeat_period_ms, DURATION_MS_RANGE) {
        warn!(
            key = "heartbeat_period_ms",
            value = options.heartbeat_period_ms,
            "out of range, using default"
        );
        options.heartbeat_period_ms = defaults.heartbeat_period_ms;
    }
    let max_bytes = u64::try_from(options.max_bytes_streaming).unwrap_or(u64::MAX);
    if !in_range(max_bytes, MAX_BYTES_RANGE) {
        warn!(
            key = "max_bytes_streaming",
            value = options.max_bytes_streaming,
            "out of range, using default"
        );
        options.max_bytes_streaming = defaults.max_bytes_streaming;
    }
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

/// Apply `SOCKJS_*` overrides read through `lookup`.
///
/// Integers must parse and fall within range; booleans accept
/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`. Invalid values are
/// ignored with a warning.
pub fn apply_overrides<F>(settings: &mut SockJsSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("SOCKJS_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u64_in("SOCKJS_PORT", 0, 65_535) {
        settings.server.port = u16::try_from(v).unwrap_or(settings.server.port);
    }
    if let Some(v) = env.u64_in("SOCKJS_SESSION_TIMEOUT_MS", DURATION_MS_RANGE.0, DURATION_MS_RANGE.1) {
        settings.sockjs.session_timeout_ms = v;
    }
    if let Some(v) = env.u64_in("SOCKJS_HEARTBEAT_MS", DURATION_MS_RANGE.0, DURATION_MS_RANGE.1) {
        settings.sockjs.heartbeat_period_ms = v;
    }
    if let Some(v) = env.u64_in("SOCKJS_MAX_BYTES_STREAMING", MAX_BYTES_RANGE.0, MAX_BYTES_RANGE.1) {
        settings.sockjs.max_bytes_streaming =
            usize::try_from(v).unwrap_or(settings.sockjs.max_bytes_streaming);
    }
    if let Some(v) = env.bool("SOCKJS_INSERT_JSESSIONID") {
        settings.sockjs.insert_jsessionid = v;
    }
    if let Some(v) = env.bool("SOCKJS_WEBSOCKET_ENABLED") {
        settings.sockjs.websocket_enabled = v;
    }
    if let Some(v) = env.string("SOCKJS_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("SOCKJS_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean (case-insensitive).
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        result
    }
}
