//! Simulation engine binary for the Agent Arena bridge.
//!
//! Wires a headless game world to an out-of-process decision backend
//! over HTTP and runs the tick loop until Ctrl-C or the tick bound.
//!
//! # Architecture
//!
//! ```text
//!   stdin ──ControlCommand──┐
//!                           v
//!   interval ──tick──> run_simulation ──observations──> HttpWire ──HTTP──> backend
//!                           ^                                 │
//!                           └─────────Completion──────────────┘
//! ```
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `arena-config.yaml` (or the path given as
//!    the first argument)
//! 2. Initialize structured logging (tracing)
//! 3. Build the HTTP wire and the arena
//! 4. Spawn the headless world's agents
//! 5. Run the simulation loop
//! 6. Save the recording if an export path is configured
//!
//! `arena-engine replay <recording.json>` instead loads a saved recording
//! and logs it tick by tick.

mod error;
mod headless_world;
mod http_wire;
mod recording;

use std::path::{Path, PathBuf};

use arena_core::config::LoggingConfig;
use arena_core::{Arena, ArenaConfig, ControlCommand, RunOptions, run_simulation};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::headless_world::HeadlessWorld;
use crate::http_wire::HttpWire;

/// Default configuration file, relative to the working directory.
const CONFIG_PATH: &str = "arena-config.yaml";

/// Buffered operator commands before stdin reads back off.
const CONTROL_CHANNEL_CAPACITY: usize = 16;

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded, the HTTP client
/// cannot be built, the backend URL is invalid, or the recording cannot be
/// written.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Some(path) = replay_target(&args) {
        init_tracing(&LoggingConfig::default());
        recording::replay_file(path)?;
        return Ok(());
    }
    let config_path = args
        .first()
        .map_or_else(|| PathBuf::from(CONFIG_PATH), PathBuf::from);

    // 1-2. Configuration, then logging as configured.
    let (config, from_file) = load_config(&config_path)?;
    init_tracing(&config.logging);
    info!("arena-engine starting");
    if !from_file {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }
    info!(
        backend_url = %config.backend.url,
        tick_rate = config.simulation.tick_rate,
        seed = config.simulation.seed,
        max_ticks = config.simulation.max_ticks,
        agents = config.agents.len(),
        "Configuration loaded"
    );

    // 3. Wire and arena.
    let (completions_tx, mut completions) = mpsc::unbounded_channel();
    let wire =
        HttpWire::new(config.backend.request_timeout(), completions_tx).map_err(EngineError::from)?;
    let mut arena = Arena::from_config(&config, Box::new(wire));
    info!(tools = ?arena.registry().names(), "Action registry ready");

    // 4. World.
    let mut world = HeadlessWorld::from_spawns(&config.agents);
    if world.agent_count() == 0 {
        warn!("No agents configured; ticks will dispatch nothing");
    }

    // 5. Run.
    let (controls_tx, mut controls) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
    spawn_control_reader(controls_tx);

    let options = RunOptions {
        backend_url: Some(config.backend.url.clone()),
        auto_start: config.simulation.auto_start,
        max_ticks: config.simulation.max_ticks,
    };
    let summary = run_simulation(
        &mut arena,
        &mut world,
        &mut completions,
        &mut controls,
        shutdown_signal(),
        &options,
    )
    .await
    .map_err(EngineError::from)?;
    arena.disconnect();

    // 6. Recording.
    if let Some(path) = &config.recording.export_path {
        recording::save_to_file(path, arena.coordinator().events().events())?;
    }

    info!(
        end_reason = ?summary.end_reason,
        final_tick = summary.final_tick,
        tools_completed = world.completed(),
        tools_failed = world.failed(),
        "arena-engine shutdown complete"
    );
    Ok(())
}

/// The recording to replay, for `replay <path>` invocations.
fn replay_target(args: &[String]) -> Option<&Path> {
    match args {
        [command, path] if command == "replay" => Some(Path::new(path)),
        _ => None,
    }
}

/// Load configuration from `path`, or defaults if the file does not exist.
///
/// The flag reports whether the file was found.
fn load_config(path: &Path) -> Result<(ArenaConfig, bool), EngineError> {
    if path.exists() {
        Ok((ArenaConfig::from_file(path)?, true))
    } else {
        let mut config = ArenaConfig::default();
        config.apply_env_overrides();
        Ok((config, false))
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Forward operator commands typed on stdin to the simulation loop.
///
/// Runs on a plain thread: a blocking stdin read cannot be cancelled and
/// would otherwise hold up runtime shutdown.
fn spawn_control_reader(controls: mpsc::Sender<ControlCommand>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<ControlCommand>() {
                Ok(command) => {
                    if controls.blocking_send(command).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Ignoring control input"),
            }
        }
    });
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl-C handler unavailable");
        std::future::pending::<()>().await;
    }
}
