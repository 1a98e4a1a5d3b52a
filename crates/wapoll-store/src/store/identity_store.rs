//! `IdentityStore`: the identity persistence API used by the runtime.
//!
//! Reads go straight to a pooled connection. Writes are serialized through an
//! in-process lock and retried on `SQLITE_BUSY`/`SQLITE_LOCKED`, so a second
//! process sharing the database file does not surface spurious failures.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::errors::{Result, StoreError};
use crate::sqlite::connection::{ConnectionConfig, ConnectionPool, PooledConnection, open_url};
use crate::sqlite::repositories::device::DeviceRepo;
use crate::sqlite::row_types::DeviceRow;
use crate::types::{ActiveIdentity, DeviceIdentity};
use wapoll_core::ids::IdentityId;

/// Durable store of device identities.
pub struct IdentityStore {
    pool: ConnectionPool,
    write_lock: Mutex<()>,
}

impl IdentityStore {
    const SQLITE_BUSY_MAX_RETRIES: u32 = 16;

    /// Wrap an already-migrated pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    /// Open the store at `url` and run migrations.
    ///
    /// Any failure is [`StoreError::Unavailable`]: the system cannot run
    /// without identity access.
    pub fn open(url: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = open_url(url, config)?;
        info!(url, "identity store opened");
        Ok(Self::new(pool))
    }

    fn conn(&self) -> Result<PooledConnection> {
        self.pool
            .get()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn with_write_lock<T>(&self, mut f: impl FnMut(&PooledConnection) -> Result<T>) -> Result<T> {
        let _guard = self.write_lock.lock();
        let conn = self.conn()?;
        let mut attempts = 0;
        loop {
            match f(&conn) {
                Ok(value) => return Ok(value),
                Err(err)
                    if Self::is_sqlite_busy_or_locked(&err)
                        && attempts < Self::SQLITE_BUSY_MAX_RETRIES =>
                {
                    attempts += 1;
                    let base_ms = u64::from(attempts).saturating_mul(10).min(250);
                    let jitter = rand::random::<u64>() % (base_ms / 4 + 1);
                    debug!(attempts, "sqlite busy, retrying write");
                    std::thread::sleep(Duration::from_millis(base_ms + jitter));
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn is_sqlite_busy_or_locked(err: &StoreError) -> bool {
        match err {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, _)) => matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    /// The identity the selector points at, if stored.
    pub fn find_active(&self, selector: &ActiveIdentity) -> Result<Option<DeviceIdentity>> {
        let conn = self.conn()?;
        let row = match selector {
            ActiveIdentity::First => DeviceRepo::get_first(&conn)?,
            ActiveIdentity::ById(id) => DeviceRepo::get_by_id(&conn, id.as_str())?,
        };
        row.map(DeviceRow::into_identity).transpose()
    }

    /// The active identity, or [`StoreError::NotFound`].
    pub fn get_active_identity(&self, selector: &ActiveIdentity) -> Result<DeviceIdentity> {
        self.find_active(selector)?
            .ok_or_else(|| StoreError::NotFound(selector.to_string()))
    }

    /// The active identity, or a fresh unsaved blank one to pair with.
    ///
    /// For [`ActiveIdentity::ById`] the blank identity carries the selected
    /// ID so a completed pairing lands where the selector points.
    pub fn active_or_blank(&self, selector: &ActiveIdentity) -> Result<DeviceIdentity> {
        if let Some(identity) = self.find_active(selector)? {
            return Ok(identity);
        }
        let mut blank = DeviceIdentity::blank();
        if let ActiveIdentity::ById(id) = selector {
            blank.id = id.clone();
        }
        Ok(blank)
    }

    /// All stored identities, oldest first.
    pub fn list_identities(&self) -> Result<Vec<DeviceIdentity>> {
        let conn = self.conn()?;
        DeviceRepo::list(&conn)?
            .into_iter()
            .map(DeviceRow::into_identity)
            .collect()
    }

    /// Number of stored identities.
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        Ok(usize::try_from(DeviceRepo::count(&conn)?).unwrap_or(0))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────

    /// Insert or update an identity.
    #[instrument(skip(self, identity), fields(identity_id = %identity.id))]
    pub fn save_identity(&self, identity: &DeviceIdentity) -> Result<()> {
        let row = DeviceRow::from_identity(identity);
        self.with_write_lock(|conn| DeviceRepo::upsert(conn, &row))?;
        debug!(paired = identity.has_credential(), "identity saved");
        Ok(())
    }

    /// Delete one identity. Idempotent; returns whether it existed.
    #[instrument(skip(self), fields(identity_id = %id))]
    pub fn delete_identity(&self, id: &IdentityId) -> Result<bool> {
        self.with_write_lock(|conn| DeviceRepo::delete(conn, id.as_str()))
    }

    /// Delete every identity. Idempotent; returns how many were removed.
    #[instrument(skip(self))]
    pub fn delete_all(&self) -> Result<usize> {
        let removed = self.with_write_lock(|conn| DeviceRepo::delete_all(conn))?;
        info!(removed, "all identities deleted");
        Ok(removed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
