//! Route handlers.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use docqa_chat::QaOrchestrator;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Chat
// =============================================================================

/// Query string for POST /api/chat.
#[derive(Debug, Default, Deserialize)]
pub struct ChatQuery {
    pub session_id: Option<String>,
}

/// Request body for POST /api/chat.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub question: String,
}

/// Session id from the query string, or a fresh UUID when absent or blank.
///
/// Ids with control characters are rejected: an SSE client would split them
/// across lines and read back a different id than the one history is keyed on.
fn resolve_session_id(requested: Option<String>) -> Result<String, ApiError> {
    match requested.filter(|s| !s.trim().is_empty()) {
        Some(id) if id.chars().any(char::is_control) => Err(ApiError::BadRequest(
            "session_id must not contain control characters".to_string(),
        )),
        Some(id) => Ok(id),
        None => Ok(Uuid::new_v4().to_string()),
    }
}

/// POST /api/chat - answer a question as a server-sent event stream.
///
/// A blank question or an unusable `session_id` is rejected with 400 before
/// the stream opens. Without a `session_id` a fresh one is assigned and
/// announced in the first event.
pub async fn chat(
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + Send>, ApiError> {
    let Json(request) = body?;
    QaOrchestrator::validate(&request.question)?;

    let session_id = resolve_session_id(query.session_id)?;
    info!(session_id = %session_id, "Chat request");

    let events = state
        .orchestrator
        .handle(&request.question, &session_id)
        .map_while(move |item| match item {
            Ok(event) => Some(Ok(Event::default().data(event.to_data()))),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Ending chat stream early");
                None
            }
        });

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

// =============================================================================
// Health
// =============================================================================

/// Response for GET /health.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// GET /health - liveness check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
