//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and implement
//! [`Default`] with production values. `#[serde(default)]` lets a settings
//! file specify only the fields it wants to change.

mod poll;
mod store;

pub use poll::*;
pub use store::*;

use serde::{Deserialize, Serialize};
use wapoll_core::logging::LogOptions;
use wapoll_core::retry::RetryConfig;

/// Root settings type.
///
/// # JSON Format
///
/// ```json
/// {
///   "store": { "databaseUrl": "sqlite:///var/lib/wapoll/devices.db" },
///   "poll": { "destination": "120363028452547709@g.us" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WapollSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Identity store location and pool sizing.
    pub store: StoreSettings,
    /// Session lifecycle behaviour.
    pub session: SessionSettings,
    /// Poll defaults and destination.
    pub poll: PollSettings,
    /// Backoff for transient connect failures.
    pub retry: RetryConfig,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for WapollSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "wapoll".to_string(),
            store: StoreSettings::default(),
            session: SessionSettings::default(),
            poll: PollSettings::default(),
            retry: RetryConfig::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl WapollSettings {
    /// Clamp out-of-range values and correct invalid invariants.
    ///
    /// Called automatically during loading. Values are corrected with a
    /// warning rather than rejected.
    pub fn validate(&mut self) {
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            let clamped = self.retry.jitter_factor.clamp(0.0, 1.0);
            tracing::warn!(
                "jitter_factor out of range ({}), clamped to {clamped}",
                self.retry.jitter_factor
            );
            self.retry.jitter_factor = clamped;
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            tracing::warn!(
                "retry max_delay_ms ({}) < base_delay_ms ({}), correcting",
                self.retry.max_delay_ms,
                self.retry.base_delay_ms
            );
            self.retry.max_delay_ms = self.retry.base_delay_ms;
        }

        if self.store.pool_size == 0 {
            tracing::warn!("store pool_size is 0, using 1");
            self.store.pool_size = 1;
        }

        if self.session.pairing_timeout_ms == 0 {
            tracing::warn!("session pairing_timeout_ms is 0, using 60000");
            self.session.pairing_timeout_ms = 60_000;
        }

        self.poll.validate();
    }
}

/// Session lifecycle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Identity to operate on. `None` selects the oldest stored identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_identity: Option<String>,
    /// Default duration of `listen` when none is given.
    pub listen_seconds: u64,
    /// How long `login` waits for the backend to issue a pairing code.
    pub pairing_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            active_identity: None,
            listen_seconds: 60,
            pairing_timeout_ms: 60_000,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingSettings {
    /// Convert to the subscriber options in `wapoll-core`.
    pub fn to_log_options(&self) -> LogOptions {
        LogOptions {
            level: self.level.clone(),
            json: self.json,
        }
    }
}
