//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`FlareSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `FLARE_*` environment variable overrides
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::FlareSettings;

/// Default settings file location (`~/.flare/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".flare").join("settings.json")
}

/// Load from [`settings_path`] with env overrides.
pub fn load_settings() -> Result<FlareSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` with env overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<FlareSettings> {
    let defaults = serde_json::to_value(FlareSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: FlareSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
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
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `FLARE_*` overrides read through `lookup`.
///
/// Invalid values are logged and ignored.
pub fn apply_env_overrides(settings: &mut FlareSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("FLARE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.number("FLARE_PORT", 0, u64::from(u16::MAX)) {
        settings.server.port = u16::try_from(v).unwrap_or(settings.server.port);
    }
    if let Some(v) = env.number("FLARE_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = to_usize(v);
    }
    if let Some(v) = env.number("FLARE_SEND_QUEUE", 1, 1_000_000) {
        settings.server.send_queue_capacity = to_usize(v);
    }
    if let Some(v) = env.number("FLARE_PING_INTERVAL_SECS", 1, 3600) {
        settings.server.ping_interval_secs = v;
    }
    if let Some(v) = env.number("FLARE_HEARTBEAT_TIMEOUT_SECS", 1, 3600) {
        settings.server.heartbeat_timeout_secs = v;
    }

    // ── Session ─────────────────────────────────────────────────────
    if let Some(v) = env.number("FLARE_FULL_RENDER_EVERY", 0, u64::from(u32::MAX)) {
        settings.session.full_render_every = u32::try_from(v).unwrap_or(0);
    }

    // ── Pubsub ──────────────────────────────────────────────────────
    if let Some(v) = env.number("FLARE_PUBSUB_WORKERS", 1, 256) {
        settings.pubsub.workers = to_usize(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("FLARE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.boolean("FLARE_LOG_JSON") {
        settings.logging.json = v;
    }
}

fn to_usize(v: u64) -> usize {
    usize::try_from(v).unwrap_or(usize::MAX)
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

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn boolean(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn number(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, min, max, "invalid numeric env var, ignoring");
        }
        result
    }
}
