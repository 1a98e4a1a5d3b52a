//! Device repository: CRUD for the `devices` table.
//!
//! Ordering is always explicit: `created_at` then `rowid`, so "the first
//! device" never depends on table scan order.

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::sqlite::row_types::DeviceRow;

const SELECT_COLUMNS: &str = "SELECT id, jid, push_name, platform, created_at, paired_at FROM devices";

/// Device repository. Stateless, every method takes `&Connection`.
pub struct DeviceRepo;

impl DeviceRepo {
    /// Insert or replace a device row by ID.
    pub fn upsert(conn: &Connection, row: &DeviceRow) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO devices (id, jid, push_name, platform, created_at, paired_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                jid = excluded.jid,
                push_name = excluded.push_name,
                platform = excluded.platform,
                paired_at = excluded.paired_at",
            params![
                row.id,
                row.jid,
                row.push_name,
                row.platform,
                row.created_at,
                row.paired_at
            ],
        )?;
        Ok(())
    }

    /// Get a device by ID.
    pub fn get_by_id(conn: &Connection, id: &str) -> Result<Option<DeviceRow>> {
        let row = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Get the oldest device.
    pub fn get_first(conn: &Connection) -> Result<Option<DeviceRow>> {
        let row = conn
            .query_row(
                &format!("{SELECT_COLUMNS} ORDER BY created_at ASC, rowid ASC LIMIT 1"),
                [],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List all devices, oldest first.
    pub fn list(conn: &Connection) -> Result<Vec<DeviceRow>> {
        let mut stmt =
            conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at ASC, rowid ASC"))?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete a device. Returns whether a row was removed.
    pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
        let changed = conn.execute("DELETE FROM devices WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Delete every device. Returns the number removed.
    pub fn delete_all(conn: &Connection) -> Result<usize> {
        let changed = conn.execute("DELETE FROM devices", [])?;
        Ok(changed)
    }

    /// Count devices.
    pub fn count(conn: &Connection) -> Result<i64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM devices", [], |row| row.get(0))?;
        Ok(count)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeviceRow> {
        Ok(DeviceRow {
            id: row.get(0)?,
            jid: row.get(1)?,
            push_name: row.get(2)?,
            platform: row.get(3)?,
            created_at: row.get(4)?,
            paired_at: row.get(5)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
