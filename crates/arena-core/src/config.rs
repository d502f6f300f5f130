//! Configuration loading and typed config structures for the arena engine.
//!
//! The canonical configuration lives in `arena-config.yaml` at the project
//! root. Every section and field has a default, so an empty file (or no file
//! at all) yields a runnable configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use arena_types::{AgentId, Vec3};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::coordinator::DEFAULT_TICK_RATE;
use crate::registry::{ActionRegistry, ToolSchema};
use crate::transport::Endpoints;

/// Shortest per-request timeout handed to the HTTP client.
pub const MIN_REQUEST_TIMEOUT_MS: u64 = 1;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration, mirroring `arena-config.yaml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArenaConfig {
    /// Tick loop settings.
    #[serde(default)]
    pub simulation: SimulationSection,

    /// Decision backend location and request settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Agents spawned into the headless world.
    #[serde(default)]
    pub agents: Vec<AgentSpawn>,

    /// Tools registered at startup.
    #[serde(default = "default_tools")]
    pub tools: Vec<ToolDefinition>,

    /// Event log export settings.
    #[serde(default)]
    pub recording: RecordingConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationSection::default(),
            backend: BackendConfig::default(),
            agents: Vec::new(),
            tools: default_tools(),
            recording: RecordingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ArenaConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `ARENA_BACKEND_URL` overrides `backend.url`
    /// - `ARENA_RECORDING_PATH` overrides `recording.export_path`
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config = Self::parse_without_env(yaml)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string, ignoring the environment.
    pub fn parse_without_env(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as unit, not as an empty map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Override settings with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ARENA_BACKEND_URL") {
            self.backend.url = val;
        }
        if let Ok(val) = std::env::var("ARENA_RECORDING_PATH") {
            self.recording.export_path = Some(PathBuf::from(val));
        }
    }

    /// Build an [`ActionRegistry`] holding every configured tool.
    pub fn build_registry(&self) -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        for tool in &self.tools {
            registry.register(tool.name.clone(), tool.schema());
        }
        registry
    }
}

/// Tick loop settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulationSection {
    /// Ticks per second; values below 1.0 are raised to 1.0.
    #[serde(default = "default_tick_rate")]
    pub tick_rate: f64,

    /// Seed recorded with the run.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Stop once the tick reaches this value (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,

    /// Start running immediately instead of waiting for a start command.
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            tick_rate: default_tick_rate(),
            seed: default_seed(),
            max_ticks: 0,
            auto_start: default_auto_start(),
        }
    }
}

/// Decision backend location and request settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the decision backend.
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Health probe path.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Observation exchange path.
    #[serde(default = "default_tick_path")]
    pub tick_path: String,

    /// Tool execution path.
    #[serde(default = "default_tool_path")]
    pub tool_path: String,

    /// Per-request timeout enforced by the HTTP client, in milliseconds.
    /// Raised to [`MIN_REQUEST_TIMEOUT_MS`] when used.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl BackendConfig {
    /// Paths used by the transport.
    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            health_path: self.health_path.clone(),
            tick_path: self.tick_path.clone(),
            tool_path: self.tool_path.clone(),
        }
    }

    /// The per-request timeout, never zero.
    pub const fn request_timeout(&self) -> Duration {
        let ms = if self.request_timeout_ms < MIN_REQUEST_TIMEOUT_MS {
            MIN_REQUEST_TIMEOUT_MS
        } else {
            self.request_timeout_ms
        };
        Duration::from_millis(ms)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            health_path: default_health_path(),
            tick_path: default_tick_path(),
            tool_path: default_tool_path(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// One agent to place in the headless world.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentSpawn {
    /// Agent identifier.
    pub id: AgentId,

    /// Starting position.
    #[serde(default)]
    pub position: Vec3,
}

/// A tool registered at startup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,

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

impl ToolDefinition {
    /// The registry schema for this tool.
    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            description: self.description.clone(),
            parameters: self.parameters.clone(),
            returns: self.returns.clone(),
        }
    }
}

/// Event log export settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RecordingConfig {
    /// Where to write the recording on shutdown; nothing is written if unset.
    #[serde(default)]
    pub export_path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

const fn default_tick_rate() -> f64 {
    DEFAULT_TICK_RATE
}

const fn default_seed() -> u64 {
    42
}

const fn default_auto_start() -> bool {
    true
}

fn default_backend_url() -> String {
    "http://127.0.0.1:5000".to_owned()
}

fn default_health_path() -> String {
    "/health".to_owned()
}

fn default_tick_path() -> String {
    "/tick".to_owned()
}

fn default_tool_path() -> String {
    "/tools/execute".to_owned()
}

const fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn empty_object() -> Value {
    json!({})
}

fn default_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "idle".to_owned(),
            description: "Do nothing this tick".to_owned(),
            parameters: json!({"type": "object", "properties": {}}),
            returns: json!({"type": "object"}),
        },
        ToolDefinition {
            name: "move_to".to_owned(),
            description: "Move toward a target position".to_owned(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "target_position": {
                        "type": "array",
                        "items": {"type": "number"},
                        "minItems": 3,
                        "maxItems": 3,
                    },
                    "speed": {"type": "number"},
                },
                "required": ["target_position"],
            }),
            returns: json!({"type": "object"}),
        },
        ToolDefinition {
            name: "collect".to_owned(),
            description: "Collect a nearby resource by name".to_owned(),
            parameters: json!({
                "type": "object",
                "properties": {"target_name": {"type": "string"}},
                "required": ["target_name"],
            }),
            returns: json!({"type": "object"}),
        },
    ]
}
