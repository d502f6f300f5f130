//! Shared type definitions for the Agent Arena simulation bridge.
//!
//! Every type that crosses the process boundary between the simulation and
//! the decision backend, or that is written to the event log, is defined
//! here so that both sides agree on one shape.
//!
//! # Modules
//!
//! - [`ids`] -- Agent and request identifiers
//! - [`observation`] -- Per-agent, per-tick observation payload
//! - [`decision`] -- Tool invocation returned by the decision backend
//! - [`wire`] -- Tick and tool lane request/response messages
//! - [`event`] -- Event log records and the event types the bridge writes

pub mod decision;
pub mod event;
pub mod ids;
pub mod observation;
pub mod wire;

// Re-export all public types at crate root for convenience.
pub use decision::{Decision, IDLE_TOOL};
pub use event::{Event, kinds};
pub use ids::{AgentId, RequestId};
pub use observation::{
    InventoryItem, MAX_PERCEIVED_ENTITIES, MetricDefinition, Objective, Observation,
    PerceivedEntity, Vec3,
};
pub use wire::{
    AgentAction, DecisionPayload, HealthStatus, TickRequest, TickResponse, ToolRequest, ToolResult,
};

/// A simulation tick number.
pub type Tick = u64;
