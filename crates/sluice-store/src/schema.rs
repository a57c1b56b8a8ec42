//! SQL DDL and the counters-table schema lifecycle.
//!
//! The `events` table layout is fixed. The `counters` table has shipped in
//! several historical layouts; every `Database::open` detects which one is on
//! disk and converges it to the current `(k, v)` shape.

use rusqlite::Connection;
use tracing::warn;

use crate::error::StoreError;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    topic TEXT NOT NULL,
    event_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    source TEXT NOT NULL,
    payload TEXT NOT NULL,
    PRIMARY KEY (topic, event_id)
);
"#;

const CREATE_COUNTERS: &str = r#"
CREATE TABLE counters (
    k TEXT PRIMARY KEY,
    v INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;

/// Legacy counters-table layouts this store knows how to migrate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegacyLayout {
    /// `(key TEXT, value INTEGER)`
    KeyValue,
    /// `(name TEXT, value INTEGER)`
    NameValue,
}

impl LegacyLayout {
    fn columns(self) -> (&'static str, &'static str) {
        match self {
            LegacyLayout::KeyValue => ("key", "value"),
            LegacyLayout::NameValue => ("name", "value"),
        }
    }
}

/// What `Database::open` found on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CounterSchema {
    Missing,
    Current,
    Legacy(LegacyLayout),
    Unknown(Vec<String>),
}

pub fn detect_counter_schema(conn: &Connection) -> Result<CounterSchema, StoreError> {
    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'counters'",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n > 0)?;
    if !exists {
        return Ok(CounterSchema::Missing);
    }

    let mut stmt = conn.prepare("PRAGMA table_info('counters')")?;
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<_, _>>()?;

    let has = |name: &str| columns.iter().any(|c| c == name);
    if columns.len() == 2 && has("k") && has("v") {
        Ok(CounterSchema::Current)
    } else if has("key") && has("value") {
        Ok(CounterSchema::Legacy(LegacyLayout::KeyValue))
    } else if has("name") && has("value") {
        Ok(CounterSchema::Legacy(LegacyLayout::NameValue))
    } else {
        Ok(CounterSchema::Unknown(columns))
    }
}

/// Converge the counters table to the current layout. Idempotent: an
/// already-migrated store passes through the `Current` arm untouched.
pub fn ensure_counter_schema(conn: &Connection) -> Result<(), StoreError> {
    match detect_counter_schema(conn)? {
        CounterSchema::Missing => {
            conn.execute_batch(CREATE_COUNTERS)?;
        }
        CounterSchema::Current => {}
        CounterSchema::Legacy(layout) => {
            let (key_col, value_col) = layout.columns();
            warn!(key_col, value_col, "migrating counters schema to (k,v)");
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS counters_new (
                    k TEXT PRIMARY KEY,
                    v INTEGER NOT NULL
                );",
            )?;
            conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO counters_new (k, v) SELECT {key_col}, {value_col} FROM counters"
                ),
                [],
            )?;
            conn.execute("DROP TABLE counters", [])?;
            conn.execute("ALTER TABLE counters_new RENAME TO counters", [])?;
        }
        CounterSchema::Unknown(columns) => {
            let backup = format!("counters_backup_{}", chrono::Utc::now().timestamp());
            warn!(?columns, backup = %backup, "unknown counters schema, renaming aside and recreating");
            conn.execute(&format!("ALTER TABLE counters RENAME TO {backup}"), [])?;
            conn.execute_batch(CREATE_COUNTERS)?;
        }
    }
    Ok(())
}
