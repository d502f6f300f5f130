//! Tool name to schema mapping, and routing of tool calls onto the
//! transport's tool lane.
//!
//! The registry only validates and routes. It never executes a tool itself
//! and never returns a tool's result: [`ActionRegistry::execute`] hands back a
//! [`ToolTicket`] whose acknowledgment says the call was accepted.

use std::collections::BTreeMap;

use arena_types::ToolResult;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::transport::{ToolCall, ToolTicket, Transport};

/// Description of one tool.
///
/// `parameters` is a JSON-schema-like object. Only its `required` array is
/// enforced here; the rest is informational for the decision backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Parameter schema.
    #[serde(default = "empty_object")]
    pub parameters: Value,
    /// Return value schema.
    #[serde(default = "empty_object")]
    pub returns: Value,
}

impl ToolSchema {
    /// A schema with the given description and no parameters.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            parameters: empty_object(),
            returns: empty_object(),
        }
    }

    /// Set the parameter schema.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Parameter names listed under `required`.
    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Local validation failures for a tool call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// No tool with this name is registered.
    #[error("Tool '{name}' not found")]
    NotFound {
        /// The requested tool name.
        name: String,
    },

    /// The parameters are not a JSON object.
    #[error("invalid parameters for tool '{name}': expected an object, got {found}")]
    MalformedParams {
        /// The tool.
        name: String,
        /// JSON kind that was supplied instead.
        found: String,
    },

    /// A required parameter is absent.
    #[error("missing required parameter '{parameter}' for tool '{name}'")]
    MissingParameter {
        /// The tool.
        name: String,
        /// The missing parameter.
        parameter: String,
    },
}

impl ToolError {
    /// The structured `{success: false, error}` form of this failure.
    pub fn to_result(&self) -> ToolResult {
        ToolResult::failure(self.to_string())
    }
}

/// Name to schema map of the tools agents may invoke.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    tools: BTreeMap<String, ToolSchema>,
}

impl ActionRegistry {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Insert or replace a tool. Returns the schema it replaced.
    pub fn register(&mut self, name: impl Into<String>, schema: ToolSchema) -> Option<ToolSchema> {
        let name = name.into();
        debug!(tool_name = %name, "Registered tool");
        self.tools.insert(name, schema)
    }

    /// Remove a tool. Unknown names are a no-op.
    pub fn unregister(&mut self, name: &str) -> Option<ToolSchema> {
        self.tools.remove(name)
    }

    /// Schema of a registered tool.
    pub fn schema(&self, name: &str) -> Option<&ToolSchema> {
        self.tools.get(name)
    }

    /// Names of all registered tools, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Check a tool call against the registry without sending it.
    pub fn validate(&self, name: &str, params: &Value) -> Result<(), ToolError> {
        let schema = self.schema(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_owned(),
        })?;
        let Some(params) = params.as_object() else {
            return Err(ToolError::MalformedParams {
                name: name.to_owned(),
                found: json_kind(params).to_owned(),
            });
        };
        if let Some(missing) = schema.required().find(|p| !params.contains_key(*p)) {
            return Err(ToolError::MissingParameter {
                name: name.to_owned(),
                parameter: missing.to_owned(),
            });
        }
        Ok(())
    }

    /// Validate `call` and submit it on the transport's tool lane.
    ///
    /// On success the returned ticket's acknowledgment is "accepted"; the
    /// tool's real result arrives later.
    pub fn execute(&self, transport: &mut Transport, call: ToolCall) -> Result<ToolTicket, ToolError> {
        if let Err(error) = self.validate(&call.tool_name, &call.params) {
            warn!(
                agent_id = ?call.agent_id,
                tool_name = %call.tool_name,
                tick = call.tick,
                error = %error,
                "Tool call rejected"
            );
            return Err(error);
        }
        Ok(transport.request_tool_execution(call))
    }

    /// All schemas as `[{name, description, parameters, returns}, ...]`.
    pub fn export_schemas(&self) -> Value {
        Value::Array(
            self.tools
                .iter()
                .map(|(name, schema)| {
                    json!({
                        "name": name,
                        "description": schema.description,
                        "parameters": schema.parameters,
                        "returns": schema.returns,
                    })
                })
                .collect(),
        )
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use arena_types::AgentId;
    use tokio::sync::mpsc;

    use super::*;
    use crate::transport::{Channel, Endpoints, RecordingWire};

    fn move_to_schema() -> ToolSchema {
        ToolSchema::new("Move to a position").with_parameters(json!({
            "type": "object",
            "properties": {"target_position": {"type": "array"}},
            "required": ["target_position"],
        }))
    }

    fn registry() -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        registry.register("idle", ToolSchema::new("Do nothing"));
        registry.register("move_to", move_to_schema());
        registry
    }

    #[test]
    fn register_is_last_write_wins() {
        let mut registry = registry();
        let previous = registry.register("idle", ToolSchema::new("Still nothing"));
        assert_eq!(previous.unwrap().description, "Do nothing");
        assert_eq!(registry.schema("idle").unwrap().description, "Still nothing");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let mut registry = registry();
        assert!(registry.unregister("fly").is_none());
        assert!(registry.unregister("idle").is_some());
        assert_eq!(registry.names(), vec!["move_to"]);
    }

    #[test]
    fn unknown_tool_is_structured_failure() {
        let err = registry().validate("fly", &json!({})).unwrap_err();
        assert_eq!(err, ToolError::NotFound { name: "fly".to_owned() });
        let result = err.to_result();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Tool 'fly' not found"));
    }

    #[test]
    fn non_object_params_are_malformed() {
        let err = registry().validate("idle", &json!([1, 2])).unwrap_err();
        assert!(matches!(err, ToolError::MalformedParams { ref found, .. } if found == "array"));
    }

    #[test]
    fn missing_required_parameter_is_reported() {
        let err = registry().validate("move_to", &json!({})).unwrap_err();
        assert_eq!(
            err,
            ToolError::MissingParameter {
                name: "move_to".to_owned(),
                parameter: "target_position".to_owned(),
            }
        );
        assert!(registry()
            .validate("move_to", &json!({"target_position": [1, 0, 2]}))
            .is_ok());
    }

    #[test]
    fn execute_routes_to_tool_lane() {
        let (wire, mut sent) = RecordingWire::new();
        let (tx, _events) = mpsc::unbounded_channel();
        let mut transport = Transport::new(Box::new(wire), Endpoints::default(), tx);
        transport.connect("http://backend").unwrap();
        sent.try_recv().unwrap();

        let ticket = registry()
            .execute(
                &mut transport,
                ToolCall::new("idle", json!({}), 4).for_agent(AgentId::from("a")),
            )
            .unwrap();
        assert_eq!(ticket.acknowledgment().data["status"], "accepted");
        assert_eq!(
            transport.in_flight(Channel::Tool).unwrap().id,
            ticket.request_id()
        );
    }

    #[test]
    fn execute_unknown_tool_never_reaches_transport() {
        let (wire, _sent) = RecordingWire::new();
        let (tx, _events) = mpsc::unbounded_channel();
        let mut transport = Transport::new(Box::new(wire), Endpoints::default(), tx);
        let err = registry()
            .execute(&mut transport, ToolCall::new("fly", json!({}), 1))
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
        assert!(transport.in_flight(Channel::Tool).is_none());
    }

    #[test]
    fn export_lists_every_tool() {
        let exported = registry().export_schemas();
        let tools = exported.as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["name"], "idle");
        assert_eq!(tools[1]["parameters"]["required"][0], "target_position");
    }
}
