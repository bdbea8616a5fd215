//! Settings loading: defaults, then the settings file, then `STAGELINK_*`
//! environment overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`StageLinkSettings::default()`]
//! 2. If the settings file exists, merge its values over the defaults
//! 3. Apply `STAGELINK_*` environment overrides (highest priority)

use std::ops::RangeInclusive;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::StageLinkSettings;

const ENV_TAG_ATTRIBUTE: &str = "STAGELINK_TAG_ATTRIBUTE";
const ENV_AUTO_LOAD_URL: &str = "STAGELINK_AUTO_LOAD_URL";
const ENV_APP_ROOT: &str = "STAGELINK_APP_ROOT";
const ENV_SETTLE_TIMEOUT_TICKS: &str = "STAGELINK_SETTLE_TIMEOUT_TICKS";
const ENV_FORWARD_PROGRESS: &str = "STAGELINK_FORWARD_PROGRESS";
const ENV_ANCHOR_ENABLED: &str = "STAGELINK_ANCHOR_ENABLED";
const ENV_TICK_INTERVAL_MS: &str = "STAGELINK_TICK_INTERVAL_MS";

/// Longest host update interval accepted from the environment.
const MAX_TICK_INTERVAL_MS: u64 = 60_000;

/// Load settings from `path` with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<StageLinkSettings> {
    let mut merged = serde_json::to_value(StageLinkSettings::default())?;
    if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        merge_into(&mut merged, serde_json::from_str(&content)?);
    } else {
        debug!(?path, "settings file not found, using defaults");
    }

    let mut settings: StageLinkSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Reject values the host cannot run with.
pub fn validate(settings: &StageLinkSettings) -> Result<()> {
    let invalid = |key, reason: &str| {
        Err(SettingsError::Invalid {
            key,
            reason: reason.to_string(),
        })
    };
    if settings.tag_attribute.trim().is_empty() {
        return invalid("tagAttribute", "must not be empty");
    }
    if settings.runtime.tick_interval_ms == 0 {
        return invalid("runtime.tickIntervalMs", "must be at least 1");
    }
    if settings.runtime.event_capacity == 0 {
        return invalid("runtime.eventCapacity", "must be at least 1");
    }
    if settings.loading.settle_timeout_ticks == Some(0) {
        return invalid("loading.settleTimeoutTicks", "must be at least 1 when set");
    }
    Ok(())
}

/// Overlay a settings file onto `target` in place.
///
/// Sections merge key by key so a file only has to name what it changes.
/// `null` keeps the current value; arrays and scalars replace it.
pub fn merge_into(target: &mut Value, overlay: Value) {
    match (target, overlay) {
        (Value::Object(section), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match section.get_mut(&key) {
                    Some(current) => merge_into(current, value),
                    None if value.is_null() => {}
                    None => {
                        let _ = section.insert(key, value);
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (target, value) => *target = value,
    }
}

/// Apply process environment overrides to loaded settings, logging any that
/// were rejected.
pub fn apply_env_overrides(settings: &mut StageLinkSettings) {
    for rejected in apply_overrides_from(settings, |name| std::env::var(name).ok()) {
        warn!(error = %rejected, "ignoring environment override");
    }
}

/// Apply overrides read through `lookup` and return the ones that did not
/// parse. A rejected override leaves the file/default value in place; empty
/// strings count as unset.
pub fn apply_overrides_from(
    settings: &mut StageLinkSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<SettingsError> {
    let mut rejected = Vec::new();
    let text = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(v) = text(ENV_TAG_ATTRIBUTE) {
        settings.tag_attribute = v;
    }
    if let Some(v) = text(ENV_AUTO_LOAD_URL) {
        settings.loading.auto_load_url = Some(v);
    }
    if let Some(v) = text(ENV_APP_ROOT) {
        settings.loading.app_root = v;
    }
    if let Some(raw) = text(ENV_SETTLE_TIMEOUT_TICKS) {
        if let Some(v) = accept(parse_bounded(ENV_SETTLE_TIMEOUT_TICKS, &raw, 1..=u64::MAX), &mut rejected) {
            settings.loading.settle_timeout_ticks = Some(v);
        }
    }
    if let Some(raw) = text(ENV_FORWARD_PROGRESS) {
        if let Some(v) = accept(parse_flag(ENV_FORWARD_PROGRESS, &raw), &mut rejected) {
            settings.loading.forward_progress = v;
        }
    }
    if let Some(raw) = text(ENV_ANCHOR_ENABLED) {
        if let Some(v) = accept(parse_flag(ENV_ANCHOR_ENABLED, &raw), &mut rejected) {
            settings.selection.anchor_enabled = v;
        }
    }
    if let Some(raw) = text(ENV_TICK_INTERVAL_MS) {
        let bounds = 1..=MAX_TICK_INTERVAL_MS;
        if let Some(v) = accept(parse_bounded(ENV_TICK_INTERVAL_MS, &raw, bounds), &mut rejected) {
            settings.runtime.tick_interval_ms = v;
        }
    }
    rejected
}

fn accept<T>(parsed: Result<T>, rejected: &mut Vec<SettingsError>) -> Option<T> {
    parsed.map_err(|e| rejected.push(e)).ok()
}

/// `1`/`true`/`yes`/`on` or `0`/`false`/`no`/`off`, any case.
fn parse_flag(key: &'static str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::Invalid {
            key,
            reason: format!("expected on/off, got {raw:?}"),
        }),
    }
}

fn parse_bounded(key: &'static str, raw: &str, bounds: RangeInclusive<u64>) -> Result<u64> {
    let value: u64 = raw.trim().parse().map_err(|_| SettingsError::Invalid {
        key,
        reason: format!("expected a whole number, got {raw:?}"),
    })?;
    if bounds.contains(&value) {
        Ok(value)
    } else {
        Err(SettingsError::Invalid {
            key,
            reason: format!("{value} is outside {}..={}", bounds.start(), bounds.end()),
        })
    }
}
