//! Simulation loop runner with operator controls.
//!
//! [`run_simulation`] drives an [`Arena`] from a single task. One
//! `tokio::select!` multiplexes:
//!
//! - **Tick interval**: advance one tick while the coordinator is running
//! - **Wire completions**: responses from the decision backend
//! - **Control commands**: start, stop, single-step, reset, tick rate
//! - **Shutdown**: any future, typically `ctrl_c`
//!
//! Every mutation of arena state happens inside that one task, so the
//! transport's lanes need no locking.

use std::future::Future;
use std::str::FromStr;

use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::arena::{Arena, GameWorld};
use crate::transport::{Completion, TransportError};

/// Errors that can occur during the simulation run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The backend connection could not be initiated.
    #[error("transport error: {source}")]
    Transport {
        /// The underlying transport error.
        #[from]
        source: TransportError,
    },
}

/// Operator command delivered to the running loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    /// Begin running (and recording).
    Start,
    /// Pause running (and recording).
    Stop,
    /// Advance exactly one tick, running or not.
    Step,
    /// Back to tick 0 with an empty log.
    Reset,
    /// Change the tick rate (ticks per second).
    SetTickRate(f64),
}

/// Error parsing a [`ControlCommand`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised control command: {0:?}")]
pub struct ParseControlError(pub String);

impl FromStr for ControlCommand {
    type Err = ParseControlError;

    /// Accepts `start`, `stop`, `step`, `reset`, and `rate <ticks/s>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let command = words.next().map(str::to_ascii_lowercase);
        let arg = words.next();
        match (command.as_deref(), arg) {
            (Some("start"), None) => Ok(Self::Start),
            (Some("stop" | "pause"), None) => Ok(Self::Stop),
            (Some("step"), None) => Ok(Self::Step),
            (Some("reset"), None) => Ok(Self::Reset),
            (Some("rate"), Some(rate)) => rate
                .parse::<f64>()
                .map(Self::SetTickRate)
                .map_err(|e| ParseControlError(format!("{s}: {e}"))),
            _ => Err(ParseControlError(s.to_owned())),
        }
    }
}

/// Settings for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Backend to connect to before the first tick, if any.
    pub backend_url: Option<String>,
    /// Start running immediately.
    pub auto_start: bool,
    /// Stop once the tick reaches this value (0 = unlimited).
    pub max_ticks: u64,
}

/// Why the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The tick bound was reached.
    MaxTicksReached,
    /// The shutdown future resolved.
    Shutdown,
}

/// Result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Why the run ended.
    pub end_reason: EndReason,
    /// Tick counter at the end.
    pub final_tick: u64,
    /// Ticks advanced by the interval timer (manual steps not counted).
    pub ticks_run: u64,
}

/// Run the simulation loop until `shutdown` resolves or the tick bound is hit.
///
/// The coordinator is stopped before returning so the recording is closed.
pub async fn run_simulation(
    arena: &mut Arena,
    world: &mut dyn GameWorld,
    completions: &mut mpsc::UnboundedReceiver<Completion>,
    controls: &mut mpsc::Receiver<ControlCommand>,
    shutdown: impl Future<Output = ()>,
    options: &RunOptions,
) -> Result<RunSummary, RunnerError> {
    if let Some(url) = &options.backend_url {
        arena.connect(url)?;
    }
    if options.auto_start {
        arena.coordinator_mut().start();
    }
    arena.process_notifications(world);

    info!(
        tick_rate = arena.coordinator().tick_rate(),
        max_ticks = options.max_ticks,
        running = arena.coordinator().is_running(),
        "Simulation loop starting"
    );

    let mut interval = tick_interval(arena);
    let mut ticks_run: u64 = 0;
    let mut controls_open = true;
    tokio::pin!(shutdown);

    let end_reason = loop {
        if bound_reached(arena, options) {
            info!(tick = arena.coordinator().tick(), max_ticks = options.max_ticks, "Tick limit reached");
            break EndReason::MaxTicksReached;
        }

        tokio::select! {
            () = &mut shutdown => {
                info!(tick = arena.coordinator().tick(), "Shutdown requested");
                break EndReason::Shutdown;
            }
            Some(completion) = completions.recv() => {
                arena.handle_completion(completion, world);
            }
            command = controls.recv(), if controls_open => {
                match command {
                    Some(command) => {
                        let rate_before = arena.coordinator().tick_rate();
                        arena.apply_control(command, world);
                        if arena.coordinator().tick_rate().total_cmp(&rate_before).is_ne() {
                            interval = tick_interval(arena);
                        }
                    }
                    None => {
                        warn!("Control channel closed");
                        controls_open = false;
                    }
                }
            }
            _ = interval.tick() => {
                if arena.coordinator().is_running() {
                    arena.advance(world);
                    ticks_run = ticks_run.saturating_add(1);
                }
            }
        }
    };

    arena.coordinator_mut().stop();
    let summary = RunSummary {
        end_reason,
        final_tick: arena.coordinator().tick(),
        ticks_run,
    };
    info!(
        end_reason = ?summary.end_reason,
        final_tick = summary.final_tick,
        ticks_run = summary.ticks_run,
        events = arena.coordinator().events().len(),
        "Simulation loop ended"
    );
    Ok(summary)
}

fn tick_interval(arena: &Arena) -> Interval {
    let period = arena.coordinator().tick_interval();
    let now = tokio::time::Instant::now();
    // First tick one period from now, not immediately.
    let mut interval = tokio::time::interval_at(now.checked_add(period).unwrap_or(now), period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

const fn bound_reached(arena: &Arena, options: &RunOptions) -> bool {
    options.max_ticks > 0 && arena.coordinator().tick() >= options.max_ticks
}
