//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`HostlinkSettings::default()`]
//! 2. If `~/.hostlink/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `HOSTLINK_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::HostlinkSettings;

/// Resolve the path to the settings file (`~/.hostlink/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".hostlink").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HostlinkSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid merged value
/// is an error.
pub fn load_settings_from_path(path: &Path) -> Result<HostlinkSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Defaults deep-merged with the file at `path`, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<HostlinkSettings> {
    let defaults = serde_json::to_value(HostlinkSettings::default())?;

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

/// Reject settings the bridge cannot run with.
pub fn validate(settings: &HostlinkSettings) -> Result<()> {
    let url = &settings.socket.url;
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        return Err(SettingsError::InvalidValue(format!(
            "socket url must be a ws:// or wss:// address, got {url}"
        )));
    }
    if settings.socket.reconnect_delay_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "socket reconnect delay must be positive".to_string(),
        ));
    }
    if settings.calls.timeout_ms == Some(0) {
        return Err(SettingsError::InvalidValue(
            "call timeout must be positive when set".to_string(),
        ));
    }
    Ok(())
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning and fall back to file/default.
pub fn apply_env_overrides(settings: &mut HostlinkSettings) {
    // ── Socket ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("HOSTLINK_SOCKET_URL") {
        settings.socket.url = v;
    }
    if let Some(v) = read_env_u64("HOSTLINK_RECONNECT_DELAY_MS", 1, 600_000) {
        settings.socket.reconnect_delay_ms = v;
    }

    // ── Calls ───────────────────────────────────────────────────────
    if let Some(v) = read_env_u64("HOSTLINK_CALL_TIMEOUT_MS", 1, 3_600_000) {
        settings.calls.timeout_ms = Some(v);
    }

    // ── Peer ────────────────────────────────────────────────────────
    if let Some(v) = read_env_string("HOSTLINK_PEER_HOST") {
        settings.peer.host = v;
    }
    if let Some(v) = read_env_u16("HOSTLINK_PEER_PORT", 1, 65535) {
        settings.peer.port = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("HOSTLINK_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("HOSTLINK_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

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
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = json!({"socket": {"url": "ws://127.0.0.1:1818", "reconnectDelayMs": 3000}});
        let source = json!({"socket": {"reconnectDelayMs": 500}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["socket"]["reconnectDelayMs"], 500);
        assert_eq!(merged["socket"]["url"], "ws://127.0.0.1:1818");
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(json!({"items": [1, 2, 3]}), json!({"items": [4]}));
        assert_eq!(merged["items"], json!([4]));
    }

    #[test]
    fn merge_new_keys_added() {
        let merged = deep_merge(json!({"calls": {}}), json!({"calls": {"timeoutMs": 250}}));
        assert_eq!(merged["calls"]["timeoutMs"], 250);
    }

    // ── file layer ──────────────────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_file_layer(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings.socket.reconnect_delay_ms, 3000);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"socket":{"url":"ws://127.0.0.1:9000"},"calls":{"timeoutMs":1500}}"#,
        )
        .unwrap();
        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.socket.url, "ws://127.0.0.1:9000");
        assert_eq!(settings.socket.reconnect_delay_ms, 3000);
        assert_eq!(settings.calls.timeout_ms, Some(1500));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_file_layer(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    // ── validate ────────────────────────────────────────────────────

    #[test]
    fn validate_accepts_defaults() {
        assert!(validate(&HostlinkSettings::default()).is_ok());
    }

    #[test]
    fn validate_rejects_non_ws_url() {
        let mut settings = HostlinkSettings::default();
        settings.socket.url = "http://127.0.0.1:1818".into();
        let err = validate(&settings).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue(_)));
    }

    #[test]
    fn validate_rejects_zero_delay_and_timeout() {
        let mut settings = HostlinkSettings::default();
        settings.socket.reconnect_delay_ms = 0;
        assert!(validate(&settings).is_err());

        let mut settings = HostlinkSettings::default();
        settings.calls.timeout_ms = Some(0);
        assert!(validate(&settings).is_err());
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_values() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("1818", 1, 65535), Some(1818));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u64_range("500", 1, 600_000), Some(500));
        assert_eq!(parse_u64_range("700000", 1, 600_000), None);
        assert_eq!(parse_u64_range("-1", 1, 10), None);
    }
}
