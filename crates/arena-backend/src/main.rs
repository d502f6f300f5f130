//! Reference decision backend binary.
//!
//! Serves the rule-based [`ForagingPolicy`] over HTTP for the arena
//! engine to connect to.
//!
//! # Environment
//!
//! - `ARENA_BACKEND_HOST` -- bind host (default `127.0.0.1`)
//! - `ARENA_BACKEND_PORT` -- bind port (default `5000`)
//! - `ARENA_POLICY_SEED` -- exploration seed (default `42`)
//! - `RUST_LOG` -- log filter (default `info`)
//!
//! [`ForagingPolicy`]: arena_backend::ForagingPolicy

use std::sync::Arc;

use arena_backend::{AppState, ForagingPolicy, ServerConfig, start_server};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Exploration seed when `ARENA_POLICY_SEED` is unset or invalid.
const DEFAULT_POLICY_SEED: u64 = 42;

/// Application entry point for the decision backend.
///
/// # Errors
///
/// Returns an error if the server cannot bind or fails while serving.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = ServerConfig::from_env();
    let seed = std::env::var("ARENA_POLICY_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_POLICY_SEED);

    let state = Arc::new(AppState::new(ForagingPolicy::new(seed)));
    info!(
        host = %config.host,
        port = config.port,
        seed,
        tools = ?state.tools.names(),
        "arena-backend starting"
    );

    start_server(&config, state).await?;
    Ok(())
}
