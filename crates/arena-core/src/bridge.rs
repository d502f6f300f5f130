//! Per-agent observation dispatch with re-entrancy gating.
//!
//! Each agent has at most one decision outstanding. While an agent waits,
//! its dispatches are skipped rather than queued, which bounds how stale a
//! decision can be. The waiting flag is released when the matching response
//! or failure arrives, so a failed request never wedges an agent.

use std::collections::BTreeMap;

use arena_types::{AgentId, Observation, RequestId, Tick, TickRequest};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::transport::{Channel, Correlation, RequestSpec, Transport};

/// Dispatch failures.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The agent already has a decision outstanding.
    #[error("agent {agent_id} is still waiting for its tick {outstanding_tick} decision")]
    ReentrancyViolation {
        /// The agent.
        agent_id: AgentId,
        /// Tick of the outstanding request.
        outstanding_tick: Tick,
    },

    /// The observation could not be encoded.
    #[error("failed to encode observation for agent {agent_id}: {source}")]
    Encode {
        /// The agent.
        agent_id: AgentId,
        /// The underlying serialization error.
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Outstanding {
    request_id: RequestId,
    tick: Tick,
}

/// An agent whose dispatch was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDispatch {
    /// The agent.
    pub agent_id: AgentId,
    /// Tick of the request it is still waiting on.
    pub outstanding_tick: Tick,
}

/// What one call to [`AgentBridge::dispatch`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Agents whose observation was sent, with the request id.
    pub dispatched: Vec<(AgentId, RequestId)>,
    /// Agents skipped because a decision was outstanding.
    pub skipped: Vec<SkippedDispatch>,
    /// Agents whose observation could not be encoded.
    pub failed: Vec<AgentId>,
}

/// Gatekeeper between per-tick observations and the tick lane.
#[derive(Debug, Default)]
pub struct AgentBridge {
    perceived: BTreeMap<AgentId, Observation>,
    waiting: BTreeMap<AgentId, Outstanding>,
}

impl AgentBridge {
    /// Create a bridge with no agents.
    pub const fn new() -> Self {
        Self {
            perceived: BTreeMap::new(),
            waiting: BTreeMap::new(),
        }
    }

    /// Stage an observation for the next dispatch.
    ///
    /// A newer observation for the same agent replaces an undispatched one.
    pub fn perceive(&mut self, mut observation: Observation) {
        observation.enforce_bounds();
        self.perceived
            .insert(observation.agent_id.clone(), observation);
    }

    /// Send every staged observation on the tick lane.
    ///
    /// Agents that are still waiting are skipped; their staged observation
    /// is discarded, never queued. Staged observations never outlive one
    /// dispatch.
    pub fn dispatch(
        &mut self,
        tick: Tick,
        transport: &mut Transport,
        simulation_state: &Map<String, Value>,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        for (agent_id, observation) in std::mem::take(&mut self.perceived) {
            match self.try_dispatch(tick, observation, transport, simulation_state) {
                Ok(request_id) => report.dispatched.push((agent_id, request_id)),
                Err(DispatchError::ReentrancyViolation {
                    agent_id,
                    outstanding_tick,
                }) => {
                    debug!(
                        agent_id = %agent_id,
                        tick,
                        outstanding_tick,
                        "Dispatch skipped, decision still outstanding"
                    );
                    report.skipped.push(SkippedDispatch {
                        agent_id,
                        outstanding_tick,
                    });
                }
                Err(error @ DispatchError::Encode { .. }) => {
                    warn!(agent_id = %agent_id, tick, error = %error, "Dispatch failed");
                    report.failed.push(agent_id);
                }
            }
        }
        report
    }

    /// Send one observation, refusing if the agent is already waiting.
    pub fn try_dispatch(
        &mut self,
        tick: Tick,
        observation: Observation,
        transport: &mut Transport,
        simulation_state: &Map<String, Value>,
    ) -> Result<RequestId, DispatchError> {
        let agent_id = observation.agent_id.clone();
        if let Some(outstanding) = self.waiting.get(&agent_id) {
            return Err(DispatchError::ReentrancyViolation {
                agent_id,
                outstanding_tick: outstanding.tick,
            });
        }

        let request = TickRequest {
            tick,
            perceptions: vec![observation],
            simulation_state: simulation_state.clone(),
        };
        let payload = serde_json::to_value(&request).map_err(|source| DispatchError::Encode {
            agent_id: agent_id.clone(),
            source,
        })?;

        // A send that fails synchronously is still reported through the
        // notification channel, which releases the flag set below.
        let submission = transport.request(RequestSpec {
            channel: Channel::Tick,
            agent_id: Some(agent_id.clone()),
            tool_name: None,
            tick,
            payload,
        });
        let request_id = submission.id();
        self.waiting.insert(agent_id, Outstanding { request_id, tick });
        Ok(request_id)
    }

    /// Whether `agent` has a decision outstanding.
    pub fn is_waiting(&self, agent: &AgentId) -> bool {
        self.waiting.contains_key(agent)
    }

    /// Number of agents with a decision outstanding.
    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    /// Clear the waiting flag for the request behind `correlation`.
    ///
    /// Returns the tick the request was dispatched at. Returns `None` for a
    /// response that no longer matches the agent's outstanding request
    /// (for example one that predates a reset); such a response must not be
    /// applied.
    pub fn resolve(&mut self, correlation: &Correlation) -> Option<Tick> {
        let agent = correlation.agent_id.as_ref()?;
        let outstanding = self.waiting.get(agent)?;
        if outstanding.request_id != correlation.request_id {
            return None;
        }
        let tick = outstanding.tick;
        self.waiting.remove(agent);
        Some(tick)
    }

    /// Forget every staged observation and waiting flag.
    pub fn clear(&mut self) {
        self.perceived.clear();
        self.waiting.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::transport::{Endpoints, Outbound, RecordingWire, TransportEvent};

    struct Rig {
        bridge: AgentBridge,
        transport: Transport,
        sent: mpsc::UnboundedReceiver<Outbound>,
        _events: mpsc::UnboundedReceiver<TransportEvent>,
    }

    fn rig() -> Rig {
        let (wire, mut sent) = RecordingWire::new();
        let (tx, events) = mpsc::unbounded_channel();
        let mut transport = Transport::new(Box::new(wire), Endpoints::default(), tx);
        transport.connect("http://backend").unwrap();
        sent.try_recv().unwrap();
        Rig {
            bridge: AgentBridge::new(),
            transport,
            sent,
            _events: events,
        }
    }

    fn observation(agent: &str, tick: Tick) -> Observation {
        Observation::new(AgentId::from(agent), tick, [0.0, 0.0, 0.0])
    }

    fn correlation(agent: &str, request_id: RequestId, tick: Tick) -> Correlation {
        Correlation {
            request_id,
            channel: Channel::Tick,
            agent_id: Some(AgentId::from(agent)),
            tool_name: None,
            tick,
        }
    }

    #[test]
    fn dispatch_sends_one_request_per_agent() {
        let mut r = rig();
        r.bridge.perceive(observation("a", 1));
        r.bridge.perceive(observation("b", 1));
        let report = r.bridge.dispatch(1, &mut r.transport, &Map::new());
        assert_eq!(report.dispatched.len(), 2);
        assert!(report.skipped.is_empty());
        assert!(r.bridge.is_waiting(&AgentId::from("a")));

        let body = r.sent.try_recv().unwrap().body.unwrap();
        assert_eq!(body["tick"], 1);
        assert_eq!(body["perceptions"][0]["agent_id"], "a");
    }

    #[test]
    fn waiting_agent_is_skipped_not_queued() {
        let mut r = rig();
        r.bridge.perceive(observation("a", 10));
        r.bridge.dispatch(10, &mut r.transport, &Map::new());

        r.bridge.perceive(observation("a", 11));
        let report = r.bridge.dispatch(11, &mut r.transport, &Map::new());
        assert!(report.dispatched.is_empty());
        assert_eq!(
            report.skipped,
            vec![SkippedDispatch {
                agent_id: AgentId::from("a"),
                outstanding_tick: 10,
            }]
        );
        assert_eq!(r.transport.queued_len(Channel::Tick), 0);
    }

    #[test]
    fn try_dispatch_guards_reentrancy() {
        let mut r = rig();
        r.bridge
            .try_dispatch(3, observation("a", 3), &mut r.transport, &Map::new())
            .unwrap();
        let err = r
            .bridge
            .try_dispatch(3, observation("a", 3), &mut r.transport, &Map::new())
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::ReentrancyViolation { outstanding_tick: 3, .. }
        ));
    }

    #[test]
    fn resolve_returns_origin_tick_and_releases() {
        let mut r = rig();
        let id = r
            .bridge
            .try_dispatch(10, observation("a", 10), &mut r.transport, &Map::new())
            .unwrap();
        assert_eq!(r.bridge.resolve(&correlation("a", id, 10)), Some(10));
        assert!(!r.bridge.is_waiting(&AgentId::from("a")));
        assert_eq!(r.bridge.resolve(&correlation("a", id, 10)), None);
    }

    #[test]
    fn stale_response_does_not_release() {
        let mut r = rig();
        r.bridge
            .try_dispatch(5, observation("a", 5), &mut r.transport, &Map::new())
            .unwrap();
        assert_eq!(r.bridge.resolve(&correlation("a", RequestId::new(), 5)), None);
        assert!(r.bridge.is_waiting(&AgentId::from("a")));
    }

    #[test]
    fn newer_observation_replaces_staged_one() {
        let mut r = rig();
        r.bridge.perceive(observation("a", 1));
        r.bridge.perceive(observation("a", 2));
        let report = r.bridge.dispatch(2, &mut r.transport, &Map::new());
        assert_eq!(report.dispatched.len(), 1);
        let body = r.sent.try_recv().unwrap().body.unwrap();
        assert_eq!(body["perceptions"][0]["tick"], 2);
    }

    #[test]
    fn clear_forgets_waiting_agents() {
        let mut r = rig();
        r.bridge.perceive(observation("a", 1));
        r.bridge.dispatch(1, &mut r.transport, &Map::new());
        r.bridge.clear();
        assert_eq!(r.bridge.waiting_count(), 0);
        assert!(!r.bridge.is_waiting(&AgentId::from("a")));
    }
}
