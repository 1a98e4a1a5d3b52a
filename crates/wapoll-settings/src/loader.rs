//! Settings file discovery, deep merge, and environment overrides.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{Result, SettingsError};
use crate::types::WapollSettings;

/// Env var for the identity store connection string.
pub const ENV_DATABASE_URL: &str = "WAPOLL_DATABASE_URL";
/// Legacy name for [`ENV_DATABASE_URL`], still honoured.
pub const ENV_DATABASE_URL_LEGACY: &str = "WHATSAPP_POLL_DATABASE_URL";
/// Env var for the poll destination chat.
pub const ENV_POLL_DESTINATION: &str = "WAPOLL_POLL_DESTINATION";
/// Env var selecting the active identity by ID.
pub const ENV_ACTIVE_IDENTITY: &str = "WAPOLL_ACTIVE_IDENTITY";
/// Env var for the default log filter.
pub const ENV_LOG_LEVEL: &str = "WAPOLL_LOG_LEVEL";
/// Env var switching JSON log output (`1`/`true`).
pub const ENV_LOG_JSON: &str = "WAPOLL_LOG_JSON";

/// Path of the user settings file: `$WAPOLL_HOME/settings.json`, or
/// `~/.wapoll/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Ok(home) = std::env::var("WAPOLL_HOME") {
        return PathBuf::from(home).join("settings.json");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".wapoll").join("settings.json")
}

/// Load settings from `path`, deep-merged over defaults, with env overrides.
///
/// A missing file is not an error: defaults plus env overrides are returned.
pub fn load_settings_from_path(path: &Path) -> Result<WapollSettings> {
    let defaults = serde_json::to_value(WapollSettings::default())?;
    let merged = match std::fs::read_to_string(path) {
        Ok(raw) => {
            let user: Value = serde_json::from_str(&raw)?;
            deep_merge(defaults, user)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(?path, "no settings file, using defaults");
            defaults
        }
        Err(source) => {
            return Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut settings: WapollSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

/// Recursively merge `overlay` into `base`. Objects merge key by key; any
/// other overlay value (including arrays) replaces the base value. `null`
/// in the overlay leaves the base untouched.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_val) => deep_merge(base_val, overlay_val),
                    None => overlay_val,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Apply `WAPOLL_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut WapollSettings) {
    apply_env_overrides_with(settings, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary variable lookup.
pub fn apply_env_overrides_with(
    settings: &mut WapollSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = non_empty(ENV_DATABASE_URL).or_else(|| non_empty(ENV_DATABASE_URL_LEGACY)) {
        settings.store.database_url = url;
    }
    if let Some(dest) = non_empty(ENV_POLL_DESTINATION) {
        settings.poll.destination = Some(dest);
    }
    if let Some(id) = non_empty(ENV_ACTIVE_IDENTITY) {
        settings.session.active_identity = Some(id);
    }
    if let Some(level) = non_empty(ENV_LOG_LEVEL) {
        settings.logging.level = level;
    }
    if let Some(json) = non_empty(ENV_LOG_JSON) {
        settings.logging.json = matches!(json.trim(), "1" | "true" | "TRUE" | "yes");
    }
}
