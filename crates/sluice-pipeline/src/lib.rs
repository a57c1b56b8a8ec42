pub mod consumer;
pub mod ingest;
pub mod queue;

pub use consumer::ConsumerHandle;
pub use ingest::{Ingestor, StatsReport};
pub use queue::{IngestionQueue, QueueClosed, QueueReceiver};
