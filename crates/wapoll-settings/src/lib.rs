//! # wapoll-settings
//!
//! Configuration management with layered sources for wapoll.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`WapollSettings::default()`]
//! 2. **User file**: `~/.wapoll/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `WAPOLL_*` overrides (highest priority)
//!
//! The only setting the system cannot run without is the identity store
//! location (`store.databaseUrl`, env `WAPOLL_DATABASE_URL` or the legacy
//! `WHATSAPP_POLL_DATABASE_URL`).
//!
//! The binary resolves settings once at startup with
//! [`load_settings_from_path`] and passes them down as `Arc<WapollSettings>`.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_env_overrides_with, deep_merge, load_settings_from_path,
    settings_path,
};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
