//! The decision returned by the backend for one observation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the tool that does nothing for a tick.
pub const IDLE_TOOL: &str = "idle";

/// A tool invocation chosen by the decision backend.
///
/// `params` is kept as an opaque JSON value. Whether it is well formed for
/// the named tool is decided later by the action registry, so a malformed
/// decision still parses and can be reported as a structured failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Name of the tool to execute.
    #[serde(rename = "tool")]
    pub tool_name: String,
    /// Tool parameters.
    #[serde(default = "empty_params")]
    pub params: Value,
    /// Optional explanation, useful for debugging.
    #[serde(rename = "reasoning", default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

fn empty_params() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Decision {
    /// Create a decision for `tool_name` with the given parameters.
    pub fn new(tool_name: impl Into<String>, params: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            params,
            rationale: None,
        }
    }

    /// Attach a rationale.
    #[must_use]
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    /// A decision to do nothing this tick.
    pub fn idle(rationale: impl Into<String>) -> Self {
        Self::new(IDLE_TOOL, empty_params()).with_rationale(rationale)
    }

    /// Whether this is the idle decision.
    pub fn is_idle(&self) -> bool {
        self.tool_name == IDLE_TOOL
    }
}
