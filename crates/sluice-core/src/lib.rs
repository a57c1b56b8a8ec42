pub mod events;

pub use events::{validate_timestamp, Event, StoredEvent, TimestampParseError};
