//! Event records appended to the tick-indexed event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One notable occurrence, tagged with the tick it was appended at.
///
/// Events are never mutated after creation. For replay, `(event_type, tick,
/// data)` is the identity of an event; `timestamp` is wall-clock metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type, e.g. `decision_applied`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Tick at which the event was appended.
    pub tick: u64,
    /// Event payload.
    pub data: Value,
    /// Wall-clock time of the append.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an event stamped with the current wall-clock time.
    pub fn new(event_type: impl Into<String>, tick: u64, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            tick,
            data,
            timestamp: Utc::now(),
        }
    }

    /// Whether two events are the same for replay purposes.
    pub fn same_replay_identity(&self, other: &Self) -> bool {
        self.event_type == other.event_type && self.tick == other.tick && self.data == other.data
    }
}

/// Event type names written by the bridge itself.
///
/// Game logic may append events of any other type.
pub mod kinds {
    /// The coordinator started running.
    pub const SIMULATION_STARTED: &str = "simulation_started";
    /// The coordinator stopped running.
    pub const SIMULATION_STOPPED: &str = "simulation_stopped";
    /// An observation was sent to the decision backend.
    pub const OBSERVATION_DISPATCHED: &str = "observation_dispatched";
    /// An agent's dispatch was skipped because a decision was outstanding.
    pub const DISPATCH_SKIPPED: &str = "dispatch_skipped";
    /// A decision was validated and handed to the tool lane.
    pub const DECISION_APPLIED: &str = "decision_applied";
    /// A decision named an unknown tool or carried malformed parameters.
    pub const DECISION_REJECTED: &str = "decision_rejected";
    /// A decision request failed at the transport level.
    pub const DECISION_FAILED: &str = "decision_failed";
    /// A tool call finished (successfully or not).
    pub const TOOL_COMPLETED: &str = "tool_completed";
    /// The health probe succeeded.
    pub const CONNECTED: &str = "connected";
    /// The health probe failed.
    pub const CONNECTION_FAILED: &str = "connection_failed";
}
