//! Per-agent observation payload.
//!
//! An [`Observation`] is what one agent perceives at one tick. It is rebuilt
//! every tick by the game scene, shipped to the decision backend inside a
//! [`TickRequest`](crate::wire::TickRequest), and dropped after dispatch.
//!
//! The shape mirrors what the decision backend expects on the wire: vectors
//! are `[x, y, z]` arrays and optional sections are omitted when empty.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::AgentId;

/// A position, rotation, or velocity as `[x, y, z]`.
pub type Vec3 = [f64; 3];

/// Upper bound on each perceived-entity list carried in an observation.
pub const MAX_PERCEIVED_ENTITIES: usize = 32;

/// One entity the agent can perceive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceivedEntity {
    /// Scene name of the entity (e.g. `berry_003`).
    pub name: String,
    /// Entity category (e.g. `berry`, `fire`, `agent`).
    #[serde(rename = "type")]
    pub category: String,
    /// Distance from the observing agent.
    pub distance: f64,
    /// World position of the entity.
    pub position: Vec3,
    /// Damage dealt on contact, for hazards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<f64>,
}

impl PerceivedEntity {
    /// Create an entity record without hazard damage.
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        distance: f64,
        position: Vec3,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            distance,
            position,
            damage: None,
        }
    }
}

/// An item held by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Item identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Stack size.
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

/// How one success metric of an objective is scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Target value.
    pub target: f64,
    /// Relative importance.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Whether lower values are better (e.g. time taken).
    #[serde(default)]
    pub lower_is_better: bool,
    /// Whether the metric must be met for the objective to succeed.
    #[serde(default)]
    pub required: bool,
}

const fn default_weight() -> f64 {
    1.0
}

/// Scenario-defined goal passed to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    /// Human-readable description.
    pub description: String,
    /// Metric name to metric definition.
    #[serde(default)]
    pub success_metrics: BTreeMap<String, MetricDefinition>,
    /// Time limit in ticks (0 = unlimited).
    #[serde(default)]
    pub time_limit: u64,
}

/// Snapshot of what one agent perceives at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// The observing agent.
    pub agent_id: AgentId,
    /// Tick at which the snapshot was taken.
    pub tick: u64,
    /// Agent position.
    pub position: Vec3,
    /// Agent rotation in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Vec3>,
    /// Agent velocity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<Vec3>,
    /// Everything visible, regardless of category.
    #[serde(default)]
    pub visible_entities: Vec<PerceivedEntity>,
    /// Resources within perception range.
    #[serde(default)]
    pub nearby_resources: Vec<PerceivedEntity>,
    /// Hazards within perception range.
    #[serde(default)]
    pub nearby_hazards: Vec<PerceivedEntity>,
    /// Items currently held.
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
    /// Current health (0-100).
    #[serde(default = "default_vital")]
    pub health: f64,
    /// Current energy (0-100).
    #[serde(default = "default_vital")]
    pub energy: f64,
    /// Name of the running scenario.
    #[serde(default)]
    pub scenario_name: String,
    /// Scenario objective, if the scene defines one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<Objective>,
    /// Current values of the objective metrics.
    #[serde(default)]
    pub current_progress: BTreeMap<String, f64>,
    /// Scenario-specific extras.
    #[serde(default)]
    pub custom: serde_json::Map<String, serde_json::Value>,
}

const fn default_vital() -> f64 {
    100.0
}

impl Observation {
    /// Create an observation with only identity, tick, and position set.
    pub fn new(agent_id: AgentId, tick: u64, position: Vec3) -> Self {
        Self {
            agent_id,
            tick,
            position,
            rotation: None,
            velocity: None,
            visible_entities: Vec::new(),
            nearby_resources: Vec::new(),
            nearby_hazards: Vec::new(),
            inventory: Vec::new(),
            health: default_vital(),
            energy: default_vital(),
            scenario_name: String::new(),
            objective: None,
            current_progress: BTreeMap::new(),
            custom: serde_json::Map::new(),
        }
    }

    /// Sort every perceived-entity list by distance and cut it down to
    /// [`MAX_PERCEIVED_ENTITIES`], keeping the nearest.
    pub fn enforce_bounds(&mut self) {
        for list in [
            &mut self.visible_entities,
            &mut self.nearby_resources,
            &mut self.nearby_hazards,
        ] {
            list.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            list.truncate(MAX_PERCEIVED_ENTITIES);
        }
    }

    /// Nearest resource, if any.
    pub fn nearest_resource(&self) -> Option<&PerceivedEntity> {
        self.nearby_resources
            .iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    /// Nearest hazard, if any.
    pub fn nearest_hazard(&self) -> Option<&PerceivedEntity> {
        self.nearby_hazards
            .iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}
