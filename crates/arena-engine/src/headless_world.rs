//! A game world with no game in it.
//!
//! [`HeadlessWorld`] places the configured agents at fixed positions and
//! reports them every tick. Tool results are logged and counted but change
//! nothing, which is enough to exercise the bridge end to end without a
//! renderer.

use arena_core::config::AgentSpawn;
use arena_core::{GameWorld, ToolCompletion};
use arena_types::{AgentId, Observation, Tick, Vec3};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

/// Static agents and tool-completion counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadlessWorld {
    agents: Vec<(AgentId, Vec3)>,
    completed: u64,
    failed: u64,
}

impl HeadlessWorld {
    /// Place each configured agent at its spawn position.
    pub fn from_spawns(spawns: &[AgentSpawn]) -> Self {
        Self {
            agents: spawns
                .iter()
                .map(|spawn| (spawn.id.clone(), spawn.position))
                .collect(),
            completed: 0,
            failed: 0,
        }
    }

    /// Number of agents.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Tool calls that succeeded.
    pub const fn completed(&self) -> u64 {
        self.completed
    }

    /// Tool calls that failed.
    pub const fn failed(&self) -> u64 {
        self.failed
    }
}

impl GameWorld for HeadlessWorld {
    fn observe(&mut self, tick: Tick) -> Vec<Observation> {
        self.agents
            .iter()
            .map(|(id, position)| {
                let mut observation = Observation::new(id.clone(), tick, *position);
                observation.scenario_name = "headless".to_owned();
                observation
            })
            .collect()
    }

    fn simulation_state(&self) -> Map<String, Value> {
        let mut state = Map::new();
        state.insert("agent_count".to_owned(), json!(self.agents.len()));
        state
    }

    fn tool_completed(&mut self, completion: &ToolCompletion) {
        let agent = completion
            .agent_id
            .as_ref()
            .map_or("<scene>", AgentId::as_str);
        if completion.result.success {
            self.completed = self.completed.saturating_add(1);
            info!(
                agent_id = agent,
                tool_name = %completion.tool_name,
                tick = completion.tick,
                "Tool completed"
            );
        } else {
            self.failed = self.failed.saturating_add(1);
            warn!(
                agent_id = agent,
                tool_name = %completion.tool_name,
                tick = completion.tick,
                error = completion.result.error.as_deref().unwrap_or("unknown"),
                "Tool failed"
            );
        }
    }
}
