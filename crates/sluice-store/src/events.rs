use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use sluice_core::{validate_timestamp, Event, StoredEvent};

use crate::counters;
use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Counter values plus the set of stored topics, as one reportable structure.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreStats {
    #[serde(flatten)]
    pub counters: BTreeMap<String, i64>,
    pub topics: Vec<String>,
}

impl StoreStats {
    pub fn counter(&self, name: &str) -> i64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}

/// Idempotent event persistence keyed by `(topic, event_id)`.
///
/// All writes go through [`EventRepo::upsert`]; in the default deployment
/// only the consumer task calls it, which is what keeps the counter updates
/// race-free without app-level locking. Reads may run concurrently.
#[derive(Clone)]
pub struct EventRepo {
    db: Database,
}

impl EventRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert an event if its key is unseen. Returns `true` when newly
    /// stored, `false` when the key already existed (the stored version is
    /// kept; the incoming one is dropped).
    ///
    /// Counter contract, per upsert, in one transaction:
    /// `received` is always incremented, then exactly one of
    /// `unique_processed` / `duplicate_dropped`. An invalid timestamp aborts
    /// after the `received` increment — intake attempts are counted even
    /// when the event is never stored.
    #[instrument(skip(self, event), fields(topic = %event.topic, event_id = %event.event_id))]
    pub fn upsert(&self, event: &Event) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            counters::bump(&tx, counters::RECEIVED)?;

            if let Err(e) = validate_timestamp(&event.timestamp) {
                tx.commit()?;
                return Err(StoreError::InvalidTimestamp {
                    topic: event.topic.clone(),
                    event_id: event.event_id.clone(),
                    raw: e.raw,
                });
            }

            // The primary key is the dedup enforcement; zero rows changed
            // means the key already existed and the stored version wins.
            let payload = serde_json::to_string(&event.payload)?;
            let changed = tx.execute(
                "INSERT INTO events (topic, event_id, timestamp, source, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (topic, event_id) DO NOTHING",
                rusqlite::params![
                    event.topic,
                    event.event_id,
                    event.timestamp,
                    event.source,
                    payload,
                ],
            )?;
            let inserted = changed > 0;

            counters::bump(
                &tx,
                if inserted {
                    counters::UNIQUE_PROCESSED
                } else {
                    counters::DUPLICATE_DROPPED
                },
            )?;
            tx.commit()?;
            Ok(inserted)
        })
    }

    /// List stored events ordered by timestamp text ascending (lexicographic,
    /// which is chronological for well-formed ISO-8601).
    #[instrument(skip(self))]
    pub fn list(&self, topic: Option<&str>, limit: u32) -> Result<Vec<StoredEvent>, StoreError> {
        self.db.with_conn(|conn| {
            let mut results = Vec::new();
            match topic {
                Some(topic) => {
                    let mut stmt = conn.prepare(
                        "SELECT topic, event_id, timestamp, source, payload
                         FROM events WHERE topic = ?1
                         ORDER BY timestamp ASC LIMIT ?2",
                    )?;
                    let mut rows = stmt.query(rusqlite::params![topic, limit])?;
                    while let Some(row) = rows.next()? {
                        results.push(row_to_stored(row)?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT topic, event_id, timestamp, source, payload
                         FROM events ORDER BY timestamp ASC LIMIT ?1",
                    )?;
                    let mut rows = stmt.query(rusqlite::params![limit])?;
                    while let Some(row) = rows.next()? {
                        results.push(row_to_stored(row)?);
                    }
                }
            }
            Ok(results)
        })
    }

    /// All topics with at least one stored event, alphabetical.
    #[instrument(skip(self))]
    pub fn topics(&self) -> Result<Vec<String>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT topic FROM events ORDER BY topic ASC")?;
            let topics = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<_, _>>()?;
            Ok(topics)
        })
    }

    #[instrument(skip(self))]
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        self.db.with_conn(|conn| {
            let counters = counters::snapshot(conn)?;
            let mut stmt = conn.prepare("SELECT DISTINCT topic FROM events ORDER BY topic ASC")?;
            let topics = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<_, _>>()?;
            Ok(StoreStats { counters, topics })
        })
    }
}

fn row_to_stored(row: &rusqlite::Row<'_>) -> Result<StoredEvent, StoreError> {
    let payload_str: String = row_helpers::get(row, 4, "events", "payload")?;
    let payload = row_helpers::parse_json(&payload_str, "events", "payload")?;

    Ok(StoredEvent {
        topic: row_helpers::get(row, 0, "events", "topic")?,
        event_id: row_helpers::get(row, 1, "events", "event_id")?,
        timestamp: row_helpers::get(row, 2, "events", "timestamp")?,
        source: row_helpers::get(row, 3, "events", "source")?,
        payload,
    })
}
