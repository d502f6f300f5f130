//! Messages exchanged with the decision backend.
//!
//! Two request/response lanes cross the process boundary:
//!
//! - **Tick lane** -- [`TickRequest`] out, [`DecisionPayload`] back.
//! - **Tool lane** -- [`ToolRequest`] out, [`ToolResult`] back.
//!
//! A health probe (`GET` on a fixed path) precedes both; any success-class
//! status counts as healthy and its body is only informational
//! ([`HealthStatus`]).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::decision::Decision;
use crate::ids::AgentId;
use crate::observation::Observation;

/// Observation exchange request for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRequest {
    /// Tick the observations were taken at.
    pub tick: u64,
    /// Observations to decide on.
    pub perceptions: Vec<Observation>,
    /// Opaque scene-level state.
    #[serde(default)]
    pub simulation_state: Map<String, Value>,
}

/// Tool execution request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Tool to execute.
    pub tool_name: String,
    /// Tool parameters.
    #[serde(default)]
    pub params: Value,
    /// Agent on whose behalf the tool runs (empty when scene-initiated).
    #[serde(default)]
    pub agent_id: String,
    /// Tick the call is attributed to.
    #[serde(default)]
    pub tick: u64,
}

/// Structured outcome of a tool call: `{success, error?, ...}`.
///
/// Failures of any kind (unknown tool, bad parameters, transport errors)
/// are expressed as `success: false` with an `error` string rather than as
/// panics or dropped calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool succeeded.
    pub success: bool,
    /// Failure reason when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Any further fields returned by the tool.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ToolResult {
    /// A successful result carrying `data`.
    pub const fn ok(data: Map<String, Value>) -> Self {
        Self {
            success: true,
            error: None,
            data,
        }
    }

    /// A failed result with the given reason.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            data: Map::new(),
        }
    }

    /// The acknowledgment handed out when a tool call has been queued.
    ///
    /// This is not the tool's result; that arrives later.
    pub fn accepted() -> Self {
        let mut data = Map::new();
        data.insert("status".to_owned(), Value::String("accepted".to_owned()));
        Self::ok(data)
    }
}

/// One agent's action inside a batch [`TickResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    /// Agent the action is for.
    pub agent_id: AgentId,
    /// Tick echoed back by the backend, if it sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick: Option<u64>,
    /// The chosen action.
    #[serde(flatten)]
    pub decision: Decision,
}

/// Batch response: one action per perceived agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickResponse {
    /// Tick echoed back by the backend.
    pub tick: u64,
    /// Actions, one per agent.
    pub actions: Vec<AgentAction>,
    /// Backend-side timing and counters.
    #[serde(default)]
    pub metrics: Map<String, Value>,
}

/// Anything the tick lane may answer with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DecisionPayload {
    /// A single decision (`{tool, params, reasoning}`).
    Single(Decision),
    /// A batch of per-agent actions.
    Batch(TickResponse),
}

impl DecisionPayload {
    /// Extract the decision meant for `agent`.
    ///
    /// The agent comes from the originating request. A batch is searched by
    /// agent id; a batch with exactly one action answers a request that was
    /// not made for a specific agent.
    pub fn into_decision_for(self, agent: Option<&AgentId>) -> Option<Decision> {
        match self {
            Self::Single(decision) => Some(decision),
            Self::Batch(response) => match agent {
                Some(agent) => response
                    .actions
                    .into_iter()
                    .find(|action| &action.agent_id == agent)
                    .map(|action| action.decision),
                None if response.actions.len() == 1 => {
                    response.actions.into_iter().next().map(|action| action.decision)
                }
                None => None,
            },
        }
    }
}

/// Body of a health probe response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Free-form status, `ok` when healthy.
    pub status: String,
}
