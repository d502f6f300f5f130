//! Reference decision backend for the Agent Arena simulation bridge.
//!
//! An Axum HTTP server that answers the engine's two request lanes:
//!
//! - **`GET /health`** -- liveness probe, `{"status": "ok"}`
//! - **`POST /tick`** -- observations in, decisions out (a single decision
//!   for a single-observation request, a batch otherwise)
//! - **`POST /tools/execute`** -- tool calls in, `{success, error?, ...}` out
//! - **`GET /metrics`** -- request counters
//!
//! Decisions come from a [`DecisionPolicy`]; the bundled
//! [`ForagingPolicy`] is a small rule-based forager. Tool handlers only
//! acknowledge calls; they do not simulate anything.
//!
//! [`DecisionPolicy`]: policy::DecisionPolicy
//! [`ForagingPolicy`]: policy::ForagingPolicy

pub mod error;
pub mod handlers;
pub mod policy;
pub mod router;
pub mod server;
pub mod state;
pub mod tools;

// Re-export primary types for convenience.
pub use policy::{DecisionPolicy, ForagingPolicy, PolicyError};
pub use router::build_router;
pub use server::{ServerConfig, ServerError, serve, start_server};
pub use state::{AppState, MetricsSnapshot};
pub use tools::ToolDispatcher;
