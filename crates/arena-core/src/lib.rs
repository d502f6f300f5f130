//! Tick coordination, tool routing, and the decision transport for the Agent
//! Arena simulation bridge.
//!
//! Each tick the engine gathers per-agent observations, ships them to an
//! out-of-process decision backend, and applies whatever action comes back
//! exactly once, attributed to the agent and tick that asked for it, without
//! ever blocking the tick loop.
//!
//! # Modules
//!
//! - [`coordinator`] -- Authoritative tick counter, run state, event log.
//! - [`registry`] -- Tool schemas and routing of tool calls.
//! - [`transport`] -- Single-flight lanes, connection state machine,
//!   response correlation, and the [`Wire`] seam.
//! - [`bridge`] -- Per-agent dispatch with re-entrancy gating.
//! - [`arena`] -- Composition root and the per-tick pipeline.
//! - [`runner`] -- Async loop with operator controls.
//! - [`config`] -- Configuration loading from `arena-config.yaml`.
//!
//! [`Wire`]: transport::Wire

pub mod arena;
pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod registry;
pub mod runner;
pub mod transport;

pub use arena::{Arena, ArenaParts, GameWorld, TickReport, ToolCompletion};
pub use bridge::{AgentBridge, DispatchError, DispatchReport};
pub use config::{ArenaConfig, ConfigError};
pub use coordinator::{CoordinatorSignal, TickCoordinator};
pub use registry::{ActionRegistry, ToolError, ToolSchema};
pub use runner::{ControlCommand, EndReason, RunOptions, RunSummary, RunnerError, run_simulation};
pub use transport::{
    Channel, Completion, ConnectionState, Correlation, Endpoints, ToolCall, ToolTicket, Transport,
    TransportError, TransportEvent, Wire,
};
