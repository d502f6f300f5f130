//! Decision policies.
//!
//! A [`DecisionPolicy`] turns one observation into one decision. The
//! [`ForagingPolicy`] is a rule-based forager, in priority order:
//!
//! 1. Step away from any hazard closer than [`HAZARD_AVOID_DISTANCE`]
//! 2. Collect the nearest resource if it is within [`COLLECT_DISTANCE`]
//! 3. Walk toward the nearest resource
//! 4. Explore in a random direction
//!
//! Exploration is seeded per `(seed, agent, tick)` through a fixed
//! splitmix64 mix, so the same observation always yields the same decision
//! regardless of request order or toolchain.

use std::f64::consts::TAU;

use arena_types::{AgentId, Decision, Observation, Tick, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

/// Hazards closer than this are fled from.
pub const HAZARD_AVOID_DISTANCE: f64 = 3.0;

/// Resources at or within this distance are collected.
pub const COLLECT_DISTANCE: f64 = 2.0;

/// How far from a hazard the escape target is placed.
pub const ESCAPE_DISTANCE: f64 = 5.0;

/// How far an exploration step reaches.
pub const EXPLORE_DISTANCE: f64 = 5.0;

/// Errors a policy can report instead of a decision.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// The observation places the agent at a non-finite position.
    #[error("observation for agent {agent_id} has a non-finite position")]
    InvalidPosition {
        /// The observing agent.
        agent_id: AgentId,
    },
}

/// Chooses an action for one observation.
pub trait DecisionPolicy: Send + Sync {
    /// Decide what the observing agent does next.
    fn decide(&self, observation: &Observation) -> Result<Decision, PolicyError>;
}

/// Rule-based forager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForagingPolicy {
    seed: u64,
}

impl ForagingPolicy {
    /// Create a forager whose exploration is derived from `seed`.
    pub const fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn explore_rng(&self, observation: &Observation) -> StdRng {
        StdRng::seed_from_u64(explore_seed(
            self.seed,
            &observation.agent_id,
            observation.tick,
        ))
    }
}

/// Fold `seed`, the agent id bytes, and `tick` into one exploration seed.
fn explore_seed(seed: u64, agent: &AgentId, tick: Tick) -> u64 {
    let state = agent
        .as_str()
        .bytes()
        .fold(splitmix64(seed), |state, byte| {
            splitmix64(state ^ u64::from(byte))
        });
    splitmix64(state ^ tick)
}

/// One splitmix64 finalisation step.
const fn splitmix64(z: u64) -> u64 {
    let z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let z = (z ^ z.wrapping_shr(30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    let z = (z ^ z.wrapping_shr(27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ z.wrapping_shr(31)
}

impl DecisionPolicy for ForagingPolicy {
    fn decide(&self, observation: &Observation) -> Result<Decision, PolicyError> {
        if !observation.position.iter().all(|c| c.is_finite()) {
            return Err(PolicyError::InvalidPosition {
                agent_id: observation.agent_id.clone(),
            });
        }

        if let Some(hazard) = observation
            .nearest_hazard()
            .filter(|h| h.distance < HAZARD_AVOID_DISTANCE)
        {
            let target = escape_position(observation.position, hazard.position);
            return Ok(Decision::new("move_to", json!({"target_position": target}))
                .with_rationale(format!(
                    "Avoiding {} at distance {:.1}",
                    hazard.name, hazard.distance
                )));
        }

        if let Some(resource) = observation.nearest_resource() {
            if resource.distance <= COLLECT_DISTANCE {
                return Ok(
                    Decision::new("collect", json!({"target_name": resource.name}))
                        .with_rationale(format!("Collecting {}", resource.name)),
                );
            }
            return Ok(Decision::new(
                "move_to",
                json!({"target_position": resource.position}),
            )
            .with_rationale(format!(
                "Moving to {} at distance {:.1}",
                resource.name, resource.distance
            )));
        }

        let angle = self.explore_rng(observation).random_range(0.0..TAU);
        let [x, y, z] = observation.position;
        let target = [
            angle.cos().mul_add(EXPLORE_DISTANCE, x),
            y,
            angle.sin().mul_add(EXPLORE_DISTANCE, z),
        ];
        Ok(
            Decision::new("move_to", json!({"target_position": target}))
                .with_rationale("No resources nearby, exploring"),
        )
    }
}

/// Run `policy`, falling back to idle if it fails.
pub fn decide_or_idle(policy: &dyn DecisionPolicy, observation: &Observation) -> Decision {
    policy.decide(observation).unwrap_or_else(|e| {
        tracing::warn!(agent_id = %observation.agent_id, tick = observation.tick, error = %e, "Policy failed, idling");
        Decision::idle(format!("error: {e}"))
    })
}

/// A point [`ESCAPE_DISTANCE`] from the hazard on the far side from the agent,
/// measured in the ground plane.
fn escape_position(agent: Vec3, hazard: Vec3) -> Vec3 {
    let [ax, ay, az] = agent;
    let [hx, _, hz] = hazard;
    let (dx, dz) = (ax - hx, az - hz);
    let length = dx.hypot(dz);
    if length > 0.0 {
        [
            (dx / length).mul_add(ESCAPE_DISTANCE, hx),
            ay,
            (dz / length).mul_add(ESCAPE_DISTANCE, hz),
        ]
    } else {
        // Standing on the hazard: any direction will do.
        [hx + ESCAPE_DISTANCE, ay, hz]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use arena_types::PerceivedEntity;

    use super::*;

    fn observation() -> Observation {
        Observation::new(AgentId::from("forager_1"), 7, [0.0, 0.0, 0.0])
    }

    #[test]
    fn flees_close_hazard_first() {
        let mut obs = observation();
        obs.nearby_hazards
            .push(PerceivedEntity::new("fire_1", "fire", 1.0, [1.0, 0.0, 0.0]));
        obs.nearby_resources
            .push(PerceivedEntity::new("berry_1", "berry", 1.0, [0.0, 0.0, 1.0]));

        let decision = ForagingPolicy::new(1).decide(&obs).unwrap();
        assert_eq!(decision.tool_name, "move_to");
        let target = decision.params["target_position"].as_array().unwrap();
        assert!((target[0].as_f64().unwrap() + 4.0).abs() < 1e-9);
    }

    #[test]
    fn collects_resource_in_range() {
        let mut obs = observation();
        obs.nearby_resources
            .push(PerceivedEntity::new("berry_1", "berry", 1.5, [1.5, 0.0, 0.0]));
        let decision = ForagingPolicy::new(1).decide(&obs).unwrap();
        assert_eq!(decision.tool_name, "collect");
        assert_eq!(decision.params["target_name"], "berry_1");
    }

    #[test]
    fn walks_to_distant_resource() {
        let mut obs = observation();
        obs.nearby_resources
            .push(PerceivedEntity::new("berry_2", "berry", 8.0, [8.0, 0.0, 0.0]));
        obs.nearby_hazards
            .push(PerceivedEntity::new("fire_1", "fire", 6.0, [0.0, 0.0, 6.0]));
        let decision = ForagingPolicy::new(1).decide(&obs).unwrap();
        assert_eq!(decision.tool_name, "move_to");
        assert_eq!(decision.params["target_position"][0], 8.0);
    }

    #[test]
    fn exploration_is_deterministic_per_seed() {
        let a = ForagingPolicy::new(42).decide(&observation()).unwrap();
        let b = ForagingPolicy::new(42).decide(&observation()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.tool_name, "move_to");
    }

    #[test]
    fn exploration_seed_is_pinned() {
        assert_eq!(splitmix64(0), 0xE220_A839_7B1D_CDAF);
        let agent = AgentId::from("forager_1");
        assert_eq!(explore_seed(42, &agent, 7), 17_968_578_848_058_995_771);
        assert_eq!(
            explore_seed(42, &AgentId::from("forager_2"), 7),
            3_389_192_104_535_733_065
        );
        assert_eq!(explore_seed(42, &agent, 8), 9_558_767_612_682_577_337);
    }

    #[test]
    fn non_finite_position_falls_back_to_idle() {
        let mut obs = observation();
        obs.position = [f64::NAN, 0.0, 0.0];
        assert!(ForagingPolicy::new(1).decide(&obs).is_err());

        let decision = decide_or_idle(&ForagingPolicy::new(1), &obs);
        assert!(decision.is_idle());
        assert!(decision.rationale.unwrap().starts_with("error: "));
    }
}
