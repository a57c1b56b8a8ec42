use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use sluice_pipeline::Ingestor;
use sluice_server::ServerConfig;
use sluice_store::{Database, EventRepo};

#[derive(Parser, Debug)]
#[command(name = "sluice", about = "Pub-sub event aggregator with durable dedup")]
struct Args {
    /// SQLite database path
    #[arg(long, env = "DB_PATH", default_value = "data/sluice.db")]
    db_path: PathBuf,

    /// HTTP listen port
    #[arg(long, env = "PORT", default_value_t = 8089)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let db = Database::open(&args.db_path)?;
    let ingestor = Arc::new(Ingestor::start(EventRepo::new(db)));

    let handle = sluice_server::start(ServerConfig { port: args.port }, ingestor.clone()).await?;
    tracing::info!(port = handle.port, "sluice ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    // Let the consumer finish its in-flight upsert; queued events are lost.
    ingestor.shutdown().await;

    Ok(())
}
