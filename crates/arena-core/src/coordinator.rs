//! Authoritative tick counter and run state.
//!
//! The [`TickCoordinator`] owns the tick and the [`EventLog`]. It is
//! `Stopped` or `Running`; [`step`](TickCoordinator::step) works in either
//! state so a paused simulation can be single-stepped. Nothing here can
//! fail and nothing here waits on the decision backend.
//!
//! Lifecycle changes are also broadcast as [`CoordinatorSignal`]s for
//! observers that do not own the coordinator.

use std::time::Duration;

use arena_events::EventLog;
use arena_types::{Tick, kinds};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Lowest accepted tick rate, in ticks per second.
pub const MIN_TICK_RATE: f64 = 1.0;

/// Tick rate used until one is set.
pub const DEFAULT_TICK_RATE: f64 = 60.0;

const SIGNAL_CAPACITY: usize = 256;

/// Lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorSignal {
    /// The coordinator started running.
    Started,
    /// The coordinator stopped running.
    Stopped,
    /// The tick advanced to the given value.
    TickAdvanced(Tick),
    /// The tick was reset to zero and the log cleared.
    Reset,
}

/// Owner of the tick counter, the run flag, and the event log.
#[derive(Debug)]
pub struct TickCoordinator {
    tick: Tick,
    running: bool,
    tick_rate: f64,
    seed: u64,
    events: EventLog,
    signals: broadcast::Sender<CoordinatorSignal>,
}

impl TickCoordinator {
    /// Create a stopped coordinator at tick 0 that records into `events`.
    pub fn new(mut events: EventLog) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        events.set_tick(0);
        Self {
            tick: 0,
            running: false,
            tick_rate: DEFAULT_TICK_RATE,
            seed: 0,
            events,
            signals,
        }
    }

    /// Begin running and recording. No-op if already running.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.events.start_recording();
        self.events.emit(
            kinds::SIMULATION_STARTED,
            json!({"seed": self.seed, "tick_rate": self.tick_rate}),
        );
        info!(tick = self.tick, seed = self.seed, tick_rate = self.tick_rate, "Simulation started");
        self.signal(CoordinatorSignal::Started);
    }

    /// Stop running and recording. No-op if not running.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.events.emit(kinds::SIMULATION_STOPPED, json!({"tick": self.tick}));
        self.events.stop_recording();
        self.running = false;
        info!(tick = self.tick, "Simulation stopped");
        self.signal(CoordinatorSignal::Stopped);
    }

    /// Advance the tick by one, whether or not the coordinator is running.
    ///
    /// Events emitted afterwards are tagged with the new tick.
    pub fn step(&mut self) -> Tick {
        self.tick = self.tick.saturating_add(1);
        self.events.set_tick(self.tick);
        debug!(tick = self.tick, "Tick advanced");
        self.signal(CoordinatorSignal::TickAdvanced(self.tick));
        self.tick
    }

    /// Return to tick 0, stopped, with an empty log.
    pub fn reset(&mut self) {
        self.running = false;
        self.tick = 0;
        self.events.stop_recording();
        self.events.clear();
        self.events.set_tick(0);
        info!("Simulation reset");
        self.signal(CoordinatorSignal::Reset);
    }

    /// Set the advisory tick rate, clamped to [`MIN_TICK_RATE`].
    pub fn set_tick_rate(&mut self, rate: f64) {
        // NaN also lands on the minimum.
        self.tick_rate = rate.max(MIN_TICK_RATE);
    }

    /// Set the seed recorded with the next start.
    pub const fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    /// Current tick.
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Advisory ticks per second.
    pub const fn tick_rate(&self) -> f64 {
        self.tick_rate
    }

    /// Time between ticks at the current rate, never below one millisecond.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.tick_rate.recip()).max(Duration::from_millis(1))
    }

    /// Seed of the run.
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Whether the coordinator is running.
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// The event log.
    pub const fn events(&self) -> &EventLog {
        &self.events
    }

    /// The event log, for appending game events.
    pub const fn events_mut(&mut self) -> &mut EventLog {
        &mut self.events
    }

    /// Receive lifecycle signals from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorSignal> {
        self.signals.subscribe()
    }

    fn signal(&self, signal: CoordinatorSignal) {
        // No subscribers is fine.
        let _ = self.signals.send(signal);
    }
}
