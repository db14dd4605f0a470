//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TdlinkSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `TDLINK_*` environment overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{MalformedFramePolicy, TdlinkSettings};

/// Resolve the path to the settings file (`~/.tdlink/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tdlink").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TdlinkSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<TdlinkSettings> {
    let mut settings = merge_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn merge_file(path: &Path) -> Result<TdlinkSettings> {
    let defaults = serde_json::to_value(TdlinkSettings::default())?;

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

/// Apply environment variable overrides to loaded settings.
///
/// Numeric values must parse and fall within range; invalid values are
/// logged and ignored.
pub fn apply_env_overrides(settings: &mut TdlinkSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// [`apply_env_overrides`] delegates here with the process environment; tests
/// pass a map instead of mutating global state.
pub fn apply_overrides(settings: &mut TdlinkSettings, lookup: impl Fn(&str) -> Option<String>) {
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let u64_in = |name: &str, min: u64, max: u64| {
        let val = lookup(name)?;
        let parsed = parse_u64_range(&val, min, max);
        if parsed.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        parsed
    };
    let usize_in = |name: &str, min: usize, max: usize| {
        let val = lookup(name)?;
        let parsed = parse_usize_range(&val, min, max);
        if parsed.is_none() {
            tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        parsed
    };

    // ── Connection ──────────────────────────────────────────────────
    if let Some(v) = string("TDLINK_URL") {
        settings.connection.url = Some(v);
    }
    if let Some(v) = string("TDLINK_SERVER") {
        settings.connection.server = v;
    }
    if let Some(v) = string("TDLINK_TEAM") {
        settings.connection.team = Some(v);
    }
    if let Some(v) = string("TDLINK_TOKEN") {
        settings.connection.token = Some(v);
    }

    // ── Session ─────────────────────────────────────────────────────
    if let Some(v) = u64_in("TDLINK_REQUEST_TIMEOUT_MS", 1, 3_600_000) {
        settings.session.request_timeout_ms = v;
    }
    if let Some(v) = u64_in("TDLINK_WRITE_TIMEOUT_MS", 1, 600_000) {
        settings.session.write_timeout_ms = v;
    }
    if let Some(v) = u64_in("TDLINK_CLOSE_GRACE_MS", 1, 600_000) {
        settings.session.close_grace_ms = v;
    }
    if let Some(v) = usize_in("TDLINK_OUTBOUND_CAPACITY", 1, 65_536) {
        settings.session.outbound_capacity = v;
    }
    if let Some(v) = lookup("TDLINK_MALFORMED_FRAMES") {
        match parse_policy(&v) {
            Some(policy) => settings.session.malformed_frames = policy,
            None => tracing::warn!(key = "TDLINK_MALFORMED_FRAMES", value = %v, "invalid policy, ignoring"),
        }
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = string("TDLINK_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a malformed-frame policy name (case-insensitive).
pub fn parse_policy(val: &str) -> Option<MalformedFramePolicy> {
    match val.to_lowercase().as_str() {
        "skip" => Some(MalformedFramePolicy::Skip),
        "fail" => Some(MalformedFramePolicy::Fail),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"session": {"writeTimeoutMs": 1, "closeGraceMs": 2}});
        let source = serde_json::json!({"session": {"closeGraceMs": 9}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["session"]["writeTimeoutMs"], 1);
        assert_eq!(merged["session"]["closeGraceMs"], 9);
    }

    #[test]
    fn merge_skips_null() {
        let target = serde_json::json!({"a": 1});
        let merged = deep_merge(target, serde_json::json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_replaces_arrays() {
        let target = serde_json::json!({"a": [1, 2, 3]});
        let merged = deep_merge(target, serde_json::json!({"a": [4]}));
        assert_eq!(merged["a"], serde_json::json!([4]));
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = merge_file(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, TdlinkSettings::default());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"connection": {"team": "acme", "headers": {"x-client": "cli"}}, "session": {"malformedFrames": "fail"}}"#,
        )
        .unwrap();

        let settings = merge_file(&path).unwrap();
        assert_eq!(settings.connection.team.as_deref(), Some("acme"));
        assert_eq!(settings.connection.headers["x-client"], "cli");
        assert_eq!(settings.connection.server, "http://127.0.0.1:8080");
        assert_eq!(settings.session.malformed_frames, MalformedFramePolicy::Fail);
        assert_eq!(settings.session.outbound_capacity, 32);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_matches!(merge_file(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn out_of_range_file_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"session": {"outboundCapacity": 0}}"#).unwrap();
        assert_matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        );
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let env = vars(&[
            ("TDLINK_URL", "ws://localhost:9/messaging/t"),
            ("TDLINK_TOKEN", "secret"),
            ("TDLINK_REQUEST_TIMEOUT_MS", "2500"),
            ("TDLINK_OUTBOUND_CAPACITY", "8"),
            ("TDLINK_MALFORMED_FRAMES", "FAIL"),
            ("TDLINK_LOG_LEVEL", "debug"),
        ]);
        let mut settings = TdlinkSettings::default();
        apply_overrides(&mut settings, |k| env.get(k).cloned());

        assert_eq!(settings.connection.url.as_deref(), Some("ws://localhost:9/messaging/t"));
        assert_eq!(settings.connection.token.as_deref(), Some("secret"));
        assert_eq!(settings.session.request_timeout_ms, 2500);
        assert_eq!(settings.session.outbound_capacity, 8);
        assert_eq!(settings.session.malformed_frames, MalformedFramePolicy::Fail);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let env = vars(&[
            ("TDLINK_REQUEST_TIMEOUT_MS", "0"),
            ("TDLINK_OUTBOUND_CAPACITY", "lots"),
            ("TDLINK_MALFORMED_FRAMES", "explode"),
            ("TDLINK_TEAM", ""),
        ]);
        let mut settings = TdlinkSettings::default();
        apply_overrides(&mut settings, |k| env.get(k).cloned());
        assert_eq!(settings, TdlinkSettings::default());
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u64_range("100", 1, 1000), Some(100));
        assert_eq!(parse_u64_range("0", 1, 1000), None);
        assert_eq!(parse_u64_range("-5", 1, 1000), None);
        assert_eq!(parse_usize_range("65536", 1, 65_536), Some(65_536));
        assert_eq!(parse_usize_range("65537", 1, 65_536), None);
    }

    #[test]
    fn parse_policy_names() {
        assert_eq!(parse_policy("skip"), Some(MalformedFramePolicy::Skip));
        assert_eq!(parse_policy("Fail"), Some(MalformedFramePolicy::Fail));
        assert_eq!(parse_policy(""), None);
    }
}
