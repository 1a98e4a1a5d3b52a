//! Schema migrations tracked by `PRAGMA user_version`.
//!
//! Migration `i` moves the schema from version `i` to `i + 1`. Each runs in
//! its own transaction together with the version bump.

use rusqlite::Connection;

use crate::errors::Result;

const MIGRATIONS: &[&str] = &[
    // v1: device identities
    "CREATE TABLE IF NOT EXISTS devices (
        id          TEXT PRIMARY KEY,
        jid         TEXT UNIQUE,
        push_name   TEXT,
        platform    TEXT,
        created_at  TEXT NOT NULL,
        paired_at   TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_devices_created_at ON devices(created_at);",
];

/// Latest schema version.
pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}

/// Apply all pending migrations. Returns how many were applied.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let mut applied = 0;
    for (idx, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let target = idx as u32 + 1;
        conn.execute_batch(&format!(
            "BEGIN; {sql} PRAGMA user_version = {target}; COMMIT;"
        ))?;
        applied += 1;
        tracing::info!(version = target, "applied identity store migration");
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_migrates_to_latest() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), latest_version());
        let version: u32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, latest_version());
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let _ = run_migrations(&conn).unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 0);
    }

    #[test]
    fn jid_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        let _ = run_migrations(&conn).unwrap();
        let insert = "INSERT INTO devices (id, jid, created_at) VALUES (?1, 'x@s.whatsapp.net', 'now')";
        let _ = conn.execute(insert, ["a"]).unwrap();
        assert!(conn.execute(insert, ["b"]).is_err());
    }
}
