use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A producer-submitted event, as it arrives on the publish path.
///
/// Identity is the pair `(topic, event_id)` — unique within a topic only.
/// Two events with the same pair are the same logical event no matter what
/// their timestamp, source, or payload say.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Event {
    pub topic: String,
    pub event_id: String,
    /// ISO-8601 text. Parseability is checked at persistence time, not here.
    pub timestamp: String,
    pub source: String,
    pub payload: serde_json::Value,
}

/// The durable projection of an [`Event`] once it has been persisted.
/// Created exactly once per `(topic, event_id)` and never mutated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredEvent {
    pub topic: String,
    pub event_id: String,
    pub timestamp: String,
    pub source: String,
    pub payload: serde_json::Value,
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("timestamp is not ISO-8601: {raw:?}")]
pub struct TimestampParseError {
    pub raw: String,
}

/// Check that a timestamp string parses as ISO-8601.
///
/// Accepts RFC 3339 (`Z` or numeric offset) as well as the offset-less forms
/// `fromisoformat` takes: naive date-times with a `T` or space separator,
/// optional fractional seconds, and bare dates.
pub fn validate_timestamp(raw: &str) -> Result<(), TimestampParseError> {
    if DateTime::parse_from_rfc3339(raw).is_ok() {
        return Ok(());
    }
    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
    for fmt in NAIVE_FORMATS {
        if NaiveDateTime::parse_from_str(raw, fmt).is_ok() {
            return Ok(());
        }
    }
    if NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok() {
        return Ok(());
    }
    Err(TimestampParseError {
        raw: raw.to_string(),
    })
}
