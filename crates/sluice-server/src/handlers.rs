//! HTTP handlers. The transport owns structural validation (required fields
//! non-empty, payload an object, limit in range); timestamp parseability is
//! the store's concern and is checked at persistence time by the consumer.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use sluice_core::{Event, StoredEvent};
use sluice_pipeline::{QueueClosed, StatsReport};
use sluice_store::StoreError;

use crate::server::AppState;

const MAX_LIMIT: u32 = 10_000;

/// Error envelope returned to HTTP callers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<QueueClosed> for ApiError {
    fn from(e: QueueClosed) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: e.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match e {
            StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

/// One event or a batch, in the same request shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PublishBody {
    Single(Event),
    Batch { events: Vec<Event> },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub accepted: usize,
}

fn validate(event: &Event) -> Result<(), ApiError> {
    if event.topic.is_empty() || event.event_id.is_empty() || event.source.is_empty() {
        return Err(ApiError::invalid(
            "topic, event_id and source must be non-empty",
        ));
    }
    if !event.payload.is_object() {
        return Err(ApiError::invalid("payload must be an object"));
    }
    Ok(())
}

pub async fn publish(
    State(state): State<AppState>,
    Json(body): Json<PublishBody>,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    let events = match body {
        PublishBody::Single(event) => vec![event],
        PublishBody::Batch { events } => events,
    };
    for event in &events {
        validate(event)?;
    }
    let accepted = state.ingestor.publish(events)?;
    Ok((StatusCode::ACCEPTED, Json(PublishResponse { accepted })))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub topic: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

pub async fn events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<StoredEvent>>, ApiError> {
    if query.limit < 1 || query.limit > MAX_LIMIT {
        return Err(ApiError::invalid(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }
    let events = state
        .ingestor
        .read_events(query.topic.as_deref(), query.limit)?;
    Ok(Json(events))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsReport>, ApiError> {
    Ok(Json(state.ingestor.read_stats()?))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "service": "sluice",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct DemoQuery {
    pub topic: String,
    pub base_id: String,
    #[serde(default = "default_copies")]
    pub copies: u32,
}

fn default_copies() -> u32 {
    3
}

/// Publish `copies` identical events in one batch — a convenience generator
/// for exercising the dedup path.
pub async fn demo_duplicates(
    State(state): State<AppState>,
    Query(query): Query<DemoQuery>,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    let now = chrono::Utc::now().to_rfc3339();
    let events: Vec<Event> = (0..query.copies)
        .map(|_| Event {
            topic: query.topic.clone(),
            event_id: query.base_id.clone(),
            timestamp: now.clone(),
            source: "demo".to_string(),
            payload: json!({ "demo": true }),
        })
        .collect();
    for event in &events {
        validate(event)?;
    }
    let accepted = state.ingestor.publish(events)?;
    Ok((StatusCode::ACCEPTED, Json(PublishResponse { accepted })))
}
