//! HTTP request handlers for the decision backend.
//!
//! Bodies are taken as raw bytes and decoded here, so a malformed request
//! (bad JSON, wrong shape, or a missing content type) gets the same
//! `{"error", "status"}` shape as every other failure.

// Axum handlers must be async even when they never await.
#![allow(clippy::unused_async)]

use std::sync::Arc;

use arena_types::{AgentAction, HealthStatus, TickRequest, TickResponse, ToolRequest, ToolResult};
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::ApiError;
use crate::policy::decide_or_idle;
use crate::state::{AppState, MetricsSnapshot};

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Liveness probe.
pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_owned(),
    })
}

// ---------------------------------------------------------------------------
// POST /tick
// ---------------------------------------------------------------------------

/// Decide for every observation in the request.
///
/// A request with exactly one observation is answered with a bare decision
/// (`{tool, params, reasoning}`); any other count gets a batch
/// `{tick, actions, metrics}`.
pub async fn tick(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: TickRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid tick request: {e}")))?;
    state.metrics.record_tick(request.perceptions.len());

    let tick = request.tick;
    let actions: Vec<AgentAction> = request
        .perceptions
        .iter()
        .map(|observation| AgentAction {
            agent_id: observation.agent_id.clone(),
            tick: Some(tick),
            decision: decide_or_idle(state.policy.as_ref(), observation),
        })
        .collect();
    debug!(tick, actions = actions.len(), "Tick decided");

    if let [action] = actions.as_slice() {
        return Ok(Json(serde_json::to_value(&action.decision)?));
    }

    let mut metrics = Map::new();
    metrics.insert("agents_processed".to_owned(), json!(actions.len()));
    let response = TickResponse {
        tick,
        actions,
        metrics,
    };
    Ok(Json(serde_json::to_value(response)?))
}

// ---------------------------------------------------------------------------
// POST /tools/execute
// ---------------------------------------------------------------------------

/// Execute one tool call.
pub async fn execute_tool(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ToolResult>, ApiError> {
    let request: ToolRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid tool request: {e}")))?;
    state.metrics.record_tool_call();
    Ok(Json(state.tools.execute(&request)))
}

// ---------------------------------------------------------------------------
// GET /metrics
// ---------------------------------------------------------------------------

/// Request counters.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
