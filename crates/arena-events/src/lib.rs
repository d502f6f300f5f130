//! Event log and replay for the Agent Arena simulation bridge.
//!
//! The [`EventLog`] is an append-only, tick-indexed record of notable
//! occurrences. It only accepts events while recording is active; events
//! emitted outside a recording are dropped, not buffered, because they have
//! no place in a replay.
//!
//! Entries are ordered by the tick at which they were appended. The tick is
//! pushed in by the tick coordinator via [`EventLog::set_tick`]; the log
//! never advances it on its own.
//!
//! A recording leaves the log through [`EventLog::export`] and comes back
//! through [`EventLog::load`]. How it is stored in between is up to the
//! caller. [`EventLog::replay`] walks a loaded recording one tick at a time.

use arena_types::{Event, Tick};
use serde_json::Value;
use tracing::{debug, info};

/// Append-only, tick-indexed event record.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    /// Events in append order.
    events: Vec<Event>,
    /// Whether `emit` currently appends.
    recording: bool,
    /// Tick stamped onto newly emitted events.
    current_tick: Tick,
}

impl EventLog {
    /// Create an empty log that is not recording.
    pub const fn new() -> Self {
        Self {
            events: Vec::new(),
            recording: false,
            current_tick: 0,
        }
    }

    /// Append an event tagged with the current tick.
    ///
    /// Returns `true` if the event was recorded. While not recording the
    /// event is silently discarded and `false` is returned.
    pub fn emit(&mut self, event_type: impl Into<String>, data: Value) -> bool {
        if !self.recording {
            return false;
        }
        self.events
            .push(Event::new(event_type, self.current_tick, data));
        true
    }

    /// Set the tick stamped onto subsequently emitted events.
    pub const fn set_tick(&mut self, tick: Tick) {
        self.current_tick = tick;
    }

    /// The tick stamped onto newly emitted events.
    pub const fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// All events whose tick equals `tick`, in append order.
    pub fn events_for_tick(&self, tick: Tick) -> Vec<&Event> {
        self.events.iter().filter(|event| event.tick == tick).collect()
    }

    /// Every recorded event, in append order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// A deep copy of the whole log.
    pub fn export(&self) -> Vec<Event> {
        self.events.clone()
    }

    /// Replace the whole log with `events`, e.g. to seed a replay.
    pub fn load(&mut self, events: Vec<Event>) {
        info!(count = events.len(), "Loaded recording");
        self.events = events;
    }

    /// Begin accepting events. Existing events are kept.
    pub fn start_recording(&mut self) {
        if !self.recording {
            debug!(tick = self.current_tick, "Event recording started");
        }
        self.recording = true;
    }

    /// Stop accepting events. Existing events are kept.
    pub fn stop_recording(&mut self) {
        if self.recording {
            debug!(tick = self.current_tick, "Event recording stopped");
        }
        self.recording = false;
    }

    /// Whether events are currently accepted.
    pub const fn is_recording(&self) -> bool {
        self.recording
    }

    /// Remove every event, regardless of recording state.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events are recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Walk the log one tick-group at a time.
    pub fn replay(&self) -> ReplayCursor<'_> {
        ReplayCursor {
            remaining: &self.events,
        }
    }
}

/// Iterator over consecutive runs of events sharing a tick.
///
/// Because entries are appended in tick order, each group holds every event
/// of its tick and groups come out in ascending tick order.
#[derive(Debug, Clone)]
pub struct ReplayCursor<'a> {
    remaining: &'a [Event],
}

impl<'a> Iterator for ReplayCursor<'a> {
    type Item = (Tick, &'a [Event]);

    fn next(&mut self) -> Option<Self::Item> {
        let tick = self.remaining.first()?.tick;
        let len = self
            .remaining
            .iter()
            .take_while(|event| event.tick == tick)
            .count();
        let (group, rest) = self.remaining.split_at(len);
        self.remaining = rest;
        Some((tick, group))
    }
}
