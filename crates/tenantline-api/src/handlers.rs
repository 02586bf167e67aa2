//! Route handler functions for all API endpoints.
//!
//! Each handler extracts path parameters and JSON bodies via axum extractors,
//! talks to the call manager or the registry, and returns JSON responses.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};
use tenantline_core::types::WorkflowState;
use tenantline_dialogue::{CallSummary, CallView, SystemAction};
use tenantline_registry::feed::refresh_once;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Confidence assumed when the client does not send one.
const DEFAULT_CONFIDENCE: f32 = 1.0;

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StartCallRequest {
    /// Number the call came from, if telephony passed it along.
    pub caller_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UtteranceRequest {
    pub text: String,
    /// Speech-to-text confidence in 0.0 - 1.0.
    pub confidence: Option<f32>,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_calls: usize,
    pub properties: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartCallResponse {
    pub call_id: Uuid,
    pub reply: String,
    pub state: WorkflowState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallEntry {
    pub call_id: Uuid,
    pub state: WorkflowState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallListResponse {
    pub calls: Vec<CallEntry>,
}

#[derive(Debug, Serialize)]
pub struct UtteranceResponse {
    pub reply: String,
    pub state: WorkflowState,
    pub actions: Vec<SystemAction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub properties: usize,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_calls: state.manager.active_calls(),
        properties: state.index.len(),
    })
}

/// POST /calls - open a call and return the greeting.
pub async fn start_call(
    State(state): State<AppState>,
    Json(body): Json<StartCallRequest>,
) -> Result<Json<StartCallResponse>, ApiError> {
    let (call_id, outcome) = state.manager.start_call(body.caller_id)?;
    Ok(Json(StartCallResponse {
        call_id,
        reply: outcome.reply,
        state: outcome.state,
    }))
}

/// GET /calls - live calls with their current state.
pub async fn list_calls(State(state): State<AppState>) -> Result<Json<CallListResponse>, ApiError> {
    let calls = state
        .manager
        .list_calls()
        .await?
        .into_iter()
        .map(|(call_id, state)| CallEntry { call_id, state })
        .collect();
    Ok(Json(CallListResponse { calls }))
}

/// GET /calls/{id} - facts, ticket status and transcript of one live call.
pub async fn get_call(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CallView>, ApiError> {
    Ok(Json(state.manager.get_call(id).await?))
}

/// POST /calls/{id}/utterances - run one caller turn.
pub async fn post_utterance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UtteranceRequest>,
) -> Result<Json<UtteranceResponse>, ApiError> {
    let confidence = body.confidence.unwrap_or(DEFAULT_CONFIDENCE);
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ApiError::BadRequest(
            "'confidence' must be between 0.0 and 1.0".to_string(),
        ));
    }

    let outcome = state
        .manager
        .handle_utterance(id, &body.text, confidence)
        .await?;
    Ok(Json(UtteranceResponse {
        reply: outcome.reply,
        state: outcome.state,
        actions: outcome.actions,
    }))
}

/// POST /calls/{id}/hangup - end the call and return its summary.
pub async fn hangup(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CallSummary>, ApiError> {
    Ok(Json(state.manager.end_call(id).await?))
}

/// POST /registry/reload - fetch the feed and swap in the new property set.
pub async fn reload_registry(
    State(state): State<AppState>,
) -> Result<Json<ReloadResponse>, ApiError> {
    let feed = state
        .feed
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("No registry feed configured".to_string()))?;

    match refresh_once(feed.as_ref(), &state.index).await {
        Ok(properties) => {
            info!(feed = feed.name(), properties, "Registry reloaded on request");
            Ok(Json(ReloadResponse { properties }))
        }
        Err(e) => {
            warn!(feed = feed.name(), error = %e, "Registry reload failed, keeping previous set");
            Err(e.into())
        }
    }
}

/// GET /events - SSE stream of call lifecycle events.
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + Send> {
    let rx = state.manager.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(Event::default().event(event.event_name()).data(data)))
        }
        // Lagged receivers skip what they missed.
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
