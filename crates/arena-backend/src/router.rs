//! Axum router construction for the decision backend.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router for the decision backend.
///
/// The router includes:
/// - `GET /health` -- liveness probe
/// - `POST /tick` -- observations in, decisions out
/// - `POST /tools/execute` -- tool calls
/// - `GET /metrics` -- request counters
///
/// CORS allows any origin so browser-based debug tools can poll
/// `/metrics`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/tick", post(handlers::tick))
        .route("/tools/execute", post(handlers::execute_tool))
        .route("/metrics", get(handlers::metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
