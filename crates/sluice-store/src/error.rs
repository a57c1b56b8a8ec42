#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing medium cannot be reached, opened, or written.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The event's timestamp is not ISO-8601. The event is not stored;
    /// `received` has already been counted for it by the time this is raised.
    #[error("invalid timestamp {raw:?} for {topic}/{event_id}")]
    InvalidTimestamp {
        topic: String,
        event_id: String,
        raw: String,
    },

    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
