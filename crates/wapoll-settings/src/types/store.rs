use serde::{Deserialize, Serialize};

/// Default identity store location (relative to the working directory).
pub const DEFAULT_DATABASE_URL: &str = "sqlite://wapoll.db";

/// Identity store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Connection string: `sqlite://<path>`, `sqlite::memory:`, or a path.
    pub database_url: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            pool_size: 4,
            busy_timeout_ms: 5_000,
        }
    }
}
