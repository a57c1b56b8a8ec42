pub mod counters;
pub mod database;
pub mod error;
pub mod events;
pub mod row_helpers;
pub mod schema;

pub use database::Database;
pub use error::StoreError;
pub use events::{EventRepo, StoreStats};
