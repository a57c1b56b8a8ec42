//! Monotonic intake/outcome counters, persisted alongside the events.

use std::collections::BTreeMap;

use rusqlite::Connection;

use crate::error::StoreError;

pub const RECEIVED: &str = "received";
pub const UNIQUE_PROCESSED: &str = "unique_processed";
pub const DUPLICATE_DROPPED: &str = "duplicate_dropped";

pub const WELL_KNOWN: [&str; 3] = [RECEIVED, UNIQUE_PROCESSED, DUPLICATE_DROPPED];

/// Create any missing well-known counters at 0. Existing values are kept.
pub fn seed(conn: &Connection) -> Result<(), StoreError> {
    for name in WELL_KNOWN {
        conn.execute("INSERT OR IGNORE INTO counters (k, v) VALUES (?1, 0)", [name])?;
    }
    Ok(())
}

pub fn bump(conn: &Connection, name: &str) -> Result<(), StoreError> {
    conn.execute("UPDATE counters SET v = v + 1 WHERE k = ?1", [name])?;
    Ok(())
}

/// All counters currently on disk, with the well-known three guaranteed
/// present (a migrated legacy table may carry extras; they are reported too).
pub fn snapshot(conn: &Connection) -> Result<BTreeMap<String, i64>, StoreError> {
    let mut stmt = conn.prepare("SELECT k, v FROM counters")?;
    let mut counters: BTreeMap<String, i64> = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<_, _>>()?;
    for name in WELL_KNOWN {
        counters.entry(name.to_string()).or_insert(0);
    }
    Ok(counters)
}
