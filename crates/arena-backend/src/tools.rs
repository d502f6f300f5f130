//! Tool execution on the backend side.
//!
//! The [`ToolDispatcher`] maps tool names to handlers. Handlers check their
//! own parameters and acknowledge the call; they hold no world state.

use std::collections::BTreeMap;

use arena_types::{IDLE_TOOL, ToolRequest, ToolResult};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

/// A tool implementation.
pub type ToolHandler = fn(&ToolRequest) -> ToolResult;

/// Name-to-handler table.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    handlers: BTreeMap<String, ToolHandler>,
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ToolDispatcher {
    /// A dispatcher with no tools.
    pub const fn empty() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// A dispatcher with `idle`, `move_to`, and `collect`.
    pub fn with_defaults() -> Self {
        let mut dispatcher = Self::empty();
        dispatcher.register(IDLE_TOOL, idle);
        dispatcher.register("move_to", move_to);
        dispatcher.register("collect", collect);
        dispatcher
    }

    /// Register `handler` under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, handler: ToolHandler) {
        self.handlers.insert(name.into(), handler);
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Run the named tool. Unknown tools yield a failure result.
    pub fn execute(&self, request: &ToolRequest) -> ToolResult {
        let Some(handler) = self.handlers.get(&request.tool_name) else {
            warn!(tool_name = %request.tool_name, agent_id = %request.agent_id, "Tool not found");
            return ToolResult::failure(format!("Tool '{}' not found", request.tool_name));
        };
        let result = handler(request);
        debug!(
            tool_name = %request.tool_name,
            agent_id = %request.agent_id,
            tick = request.tick,
            success = result.success,
            "Tool executed"
        );
        result
    }
}

fn acknowledged(result: Value) -> ToolResult {
    let mut data = Map::new();
    data.insert("result".to_owned(), result);
    ToolResult::ok(data)
}

fn invalid_parameters(tool: &str) -> ToolResult {
    ToolResult::failure(format!("Invalid parameters for tool '{tool}'"))
}

fn idle(_request: &ToolRequest) -> ToolResult {
    acknowledged(json!({"status": "idle"}))
}

fn move_to(request: &ToolRequest) -> ToolResult {
    let target = request
        .params
        .get("target_position")
        .and_then(Value::as_array)
        .filter(|coords| coords.len() == 3 && coords.iter().all(Value::is_number));
    match target {
        Some(coords) => acknowledged(json!({"status": "moving", "target_position": coords})),
        None => invalid_parameters("move_to"),
    }
}

fn collect(request: &ToolRequest) -> ToolResult {
    match request.params.get("target_name").and_then(Value::as_str) {
        Some(name) => acknowledged(json!({"status": "collecting", "target_name": name})),
        None => invalid_parameters("collect"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(tool: &str, params: Value) -> ToolRequest {
        ToolRequest {
            tool_name: tool.to_owned(),
            params,
            agent_id: "forager_1".to_owned(),
            tick: 3,
        }
    }

    #[test]
    fn default_tools_are_registered() {
        assert_eq!(
            ToolDispatcher::default().names(),
            vec!["collect", "idle", "move_to"]
        );
    }

    #[test]
    fn unknown_tool_is_a_structured_failure() {
        let result = ToolDispatcher::default().execute(&request("fly", json!({})));
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Tool 'fly' not found"));
    }

    #[test]
    fn move_to_checks_target() {
        let dispatcher = ToolDispatcher::default();
        let ok = dispatcher.execute(&request("move_to", json!({"target_position": [1, 0, 2]})));
        assert!(ok.success);
        assert_eq!(ok.data["result"]["status"], "moving");

        let bad = dispatcher.execute(&request("move_to", json!({"target_position": "north"})));
        assert!(!bad.success);
    }

    #[test]
    fn collect_requires_a_name() {
        let dispatcher = ToolDispatcher::default();
        assert!(dispatcher.execute(&request("collect", json!({"target_name": "berry_1"}))).success);
        assert!(!dispatcher.execute(&request("collect", json!({}))).success);
    }
}
