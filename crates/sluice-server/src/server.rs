use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use sluice_pipeline::Ingestor;

use crate::handlers;

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8089 }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/publish", post(handlers::publish))
        .route("/events", get(handlers::events))
        .route("/stats", get(handlers::stats))
        .route("/health", get(handlers::health))
        .route("/demo/duplicates", post(handlers::demo_duplicates))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Port 0 binds a random free port.
pub async fn start(
    config: ServerConfig,
    ingestor: Arc<Ingestor>,
) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(AppState { ingestor });
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "sluice server started");

    let server_task = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_task,
    })
}

/// Handle returned by `start()` — keeps the serve task alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}
