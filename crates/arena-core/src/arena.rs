//! The per-tick pipeline: advance, observe, dispatch, apply, log.
//!
//! [`Arena`] is the composition root. It is built from explicitly supplied
//! parts and owns the coordinator, the registry, the transport, and the
//! agent bridge. Nothing is looked up by name at runtime.
//!
//! The game world is an external collaborator reached through
//! [`GameWorld`]: it supplies observations and receives tool completions.
//! All mutation happens on the caller's task; transport completions are fed
//! in through [`Arena::handle_completion`] and processed in arrival order.

use arena_types::{
    AgentId, Decision, Observation, RequestId, Tick, ToolResult, kinds,
};
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bridge::{AgentBridge, DispatchReport};
use crate::config::ArenaConfig;
use crate::coordinator::TickCoordinator;
use crate::registry::{ActionRegistry, ToolError};
use crate::runner::ControlCommand;
use crate::transport::{
    Channel, Completion, Correlation, Endpoints, ResponseBody, ToolCall, ToolTicket, Transport,
    TransportError, TransportEvent, Wire,
};

/// The simulation side of the bridge.
pub trait GameWorld {
    /// Observations for every agent at `tick`.
    fn observe(&mut self, tick: Tick) -> Vec<Observation>;

    /// Scene-level state sent alongside observations.
    fn simulation_state(&self) -> Map<String, Value> {
        Map::new()
    }

    /// A tool call finished, successfully or not.
    fn tool_completed(&mut self, completion: &ToolCompletion);
}

/// The outcome of one tool call, as delivered to the game world.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCompletion {
    /// Agent the call was made for, if any.
    pub agent_id: Option<AgentId>,
    /// Tool that ran.
    pub tool_name: String,
    /// Tick the call is attributed to.
    pub tick: Tick,
    /// Transport request id, if the call reached the transport.
    pub request_id: Option<RequestId>,
    /// The result.
    pub result: ToolResult,
}

/// Collaborators an [`Arena`] is assembled from.
pub struct ArenaParts {
    /// Tick counter and event log.
    pub coordinator: TickCoordinator,
    /// Tools agents may invoke.
    pub registry: ActionRegistry,
    /// Request primitive underneath the transport.
    pub wire: Box<dyn Wire>,
    /// Backend paths.
    pub endpoints: Endpoints,
}

/// What one [`Arena::advance`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// The tick that was entered.
    pub tick: Tick,
    /// Per-agent dispatch outcome.
    pub dispatch: DispatchReport,
}

/// Composition root of the simulation bridge.
#[derive(Debug)]
pub struct Arena {
    coordinator: TickCoordinator,
    registry: ActionRegistry,
    transport: Transport,
    bridge: AgentBridge,
    notifications: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Arena {
    /// Assemble an arena from its parts.
    pub fn new(parts: ArenaParts) -> Self {
        let (tx, notifications) = mpsc::unbounded_channel();
        Self {
            coordinator: parts.coordinator,
            registry: parts.registry,
            transport: Transport::new(parts.wire, parts.endpoints, tx),
            bridge: AgentBridge::new(),
            notifications,
        }
    }

    /// Assemble an arena from configuration and a wire.
    pub fn from_config(config: &ArenaConfig, wire: Box<dyn Wire>) -> Self {
        let mut coordinator = TickCoordinator::new(arena_events::EventLog::new());
        coordinator.set_tick_rate(config.simulation.tick_rate);
        coordinator.set_seed(config.simulation.seed);
        Self::new(ArenaParts {
            coordinator,
            registry: config.build_registry(),
            wire,
            endpoints: config.backend.endpoints(),
        })
    }

    /// The tick coordinator.
    pub const fn coordinator(&self) -> &TickCoordinator {
        &self.coordinator
    }

    /// The tick coordinator, for direct control.
    pub const fn coordinator_mut(&mut self) -> &mut TickCoordinator {
        &mut self.coordinator
    }

    /// The action registry.
    pub const fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// The action registry, for registering tools at runtime.
    pub const fn registry_mut(&mut self) -> &mut ActionRegistry {
        &mut self.registry
    }

    /// The transport.
    pub const fn transport(&self) -> &Transport {
        &self.transport
    }

    /// The agent bridge.
    pub const fn bridge(&self) -> &AgentBridge {
        &self.bridge
    }

    /// Point the transport at the decision backend.
    pub fn connect(&mut self, url: &str) -> Result<(), TransportError> {
        self.transport.connect(url)
    }

    /// Drop the backend connection and every outstanding decision.
    pub fn disconnect(&mut self) {
        self.transport.disconnect();
        self.bridge.clear();
    }

    /// Stage an observation for the next tick's dispatch.
    pub fn perceive(&mut self, observation: Observation) {
        self.bridge.perceive(observation);
    }

    /// Enter the next tick and dispatch every agent's observation.
    ///
    /// Never waits for decisions. Agents still waiting on an earlier
    /// decision are skipped for this tick.
    pub fn advance(&mut self, world: &mut dyn GameWorld) -> TickReport {
        let tick = self.coordinator.step();
        for observation in world.observe(tick) {
            self.bridge.perceive(observation);
        }
        let state = world.simulation_state();
        let dispatch = self.bridge.dispatch(tick, &mut self.transport, &state);

        let events = self.coordinator.events_mut();
        for (agent_id, request_id) in &dispatch.dispatched {
            events.emit(
                kinds::OBSERVATION_DISPATCHED,
                json!({"agent_id": agent_id, "request_id": request_id.to_string()}),
            );
        }
        for skipped in &dispatch.skipped {
            events.emit(
                kinds::DISPATCH_SKIPPED,
                json!({
                    "agent_id": skipped.agent_id,
                    "outstanding_tick": skipped.outstanding_tick,
                }),
            );
        }

        // Sends that failed synchronously are already waiting as notifications.
        self.process_notifications(world);
        TickReport { tick, dispatch }
    }

    /// Feed a wire completion through the transport and act on the result.
    pub fn handle_completion(&mut self, completion: Completion, world: &mut dyn GameWorld) {
        self.transport.on_completion(completion);
        self.process_notifications(world);
    }

    /// Handle every pending transport notification. Returns how many there were.
    pub fn process_notifications(&mut self, world: &mut dyn GameWorld) -> usize {
        let mut handled = 0_usize;
        while let Ok(event) = self.notifications.try_recv() {
            self.handle_event(event, world);
            handled = handled.saturating_add(1);
        }
        handled
    }

    /// Scene-initiated tool call at the current tick.
    ///
    /// Returns the pending result; its acknowledgment is only "accepted".
    pub fn call_tool(&mut self, name: &str, params: Value) -> Result<ToolTicket, ToolError> {
        let call = ToolCall::new(name, params, self.coordinator.tick());
        self.registry.execute(&mut self.transport, call)
    }

    /// Tool call on behalf of `agent` at the current tick.
    pub fn call_tool_for(
        &mut self,
        agent: AgentId,
        name: &str,
        params: Value,
    ) -> Result<ToolTicket, ToolError> {
        let call = ToolCall::new(name, params, self.coordinator.tick()).for_agent(agent);
        self.registry.execute(&mut self.transport, call)
    }

    /// Return to tick 0 with an empty log and no outstanding decisions.
    ///
    /// Requests already on the wire are left alone; their decisions are
    /// recognised as stale when they arrive and are not applied.
    pub fn reset(&mut self) {
        self.coordinator.reset();
        self.bridge.clear();
    }

    /// Apply an operator command.
    pub fn apply_control(&mut self, command: ControlCommand, world: &mut dyn GameWorld) {
        debug!(?command, "Control command");
        match command {
            ControlCommand::Start => self.coordinator.start(),
            ControlCommand::Stop => self.coordinator.stop(),
            ControlCommand::Step => {
                self.advance(world);
            }
            ControlCommand::Reset => self.reset(),
            ControlCommand::SetTickRate(rate) => {
                self.coordinator.set_tick_rate(rate);
                info!(tick_rate = self.coordinator.tick_rate(), "Tick rate changed");
            }
        }
    }

    fn handle_event(&mut self, event: TransportEvent, world: &mut dyn GameWorld) {
        match event {
            TransportEvent::Connected { url } => {
                self.coordinator
                    .events_mut()
                    .emit(kinds::CONNECTED, json!({"url": url}));
            }
            TransportEvent::ConnectionFailed { reason } => {
                self.coordinator
                    .events_mut()
                    .emit(kinds::CONNECTION_FAILED, json!({"reason": reason}));
            }
            TransportEvent::ResponseReceived {
                correlation,
                body: ResponseBody::Decision(decision),
            } => self.apply_decision(&correlation, decision, world),
            TransportEvent::ResponseReceived {
                correlation,
                body: ResponseBody::Tool(result),
            } => self.complete_tool(&correlation, result, world),
            TransportEvent::RequestFailed { correlation, error } => match correlation.channel {
                Channel::Tick => self.decision_failed(&correlation, &error),
                Channel::Tool => {
                    self.complete_tool(&correlation, ToolResult::failure(error.to_string()), world);
                }
            },
        }
    }

    fn apply_decision(
        &mut self,
        correlation: &Correlation,
        decision: Decision,
        world: &mut dyn GameWorld,
    ) {
        let (Some(origin_tick), Some(agent_id)) =
            (self.bridge.resolve(correlation), correlation.agent_id.clone())
        else {
            debug!(
                request_id = %correlation.request_id,
                agent_id = ?correlation.agent_id,
                tick = correlation.tick,
                "Discarding decision for a request that is no longer outstanding"
            );
            return;
        };

        let call = ToolCall {
            tool_name: decision.tool_name.clone(),
            params: decision.params.clone(),
            agent_id: Some(agent_id.clone()),
            tick: origin_tick,
        };
        match self.registry.execute(&mut self.transport, call) {
            Ok(ticket) => {
                self.coordinator.events_mut().emit(
                    kinds::DECISION_APPLIED,
                    json!({
                        "agent_id": agent_id,
                        "tool": decision.tool_name,
                        "params": decision.params,
                        "reasoning": decision.rationale,
                        "origin_tick": origin_tick,
                        "request_id": ticket.request_id().to_string(),
                    }),
                );
                debug!(
                    agent_id = %agent_id,
                    tool_name = %decision.tool_name,
                    tick = origin_tick,
                    "Decision applied"
                );
            }
            Err(error) => {
                self.coordinator.events_mut().emit(
                    kinds::DECISION_REJECTED,
                    json!({
                        "agent_id": agent_id,
                        "tool": decision.tool_name,
                        "params": decision.params,
                        "origin_tick": origin_tick,
                        "error": error.to_string(),
                    }),
                );
                world.tool_completed(&ToolCompletion {
                    agent_id: Some(agent_id),
                    tool_name: decision.tool_name,
                    tick: origin_tick,
                    request_id: None,
                    result: error.to_result(),
                });
            }
        }
    }

    fn decision_failed(&mut self, correlation: &Correlation, error: &TransportError) {
        let Some(origin_tick) = self.bridge.resolve(correlation) else {
            return;
        };
        warn!(
            agent_id = ?correlation.agent_id,
            tick = origin_tick,
            error = %error,
            "No decision this round, agent will be dispatched again next tick"
        );
        self.coordinator.events_mut().emit(
            kinds::DECISION_FAILED,
            json!({
                "agent_id": correlation.agent_id,
                "origin_tick": origin_tick,
                "error": error.to_string(),
            }),
        );
    }

    fn complete_tool(
        &mut self,
        correlation: &Correlation,
        result: ToolResult,
        world: &mut dyn GameWorld,
    ) {
        let tool_name = correlation.tool_name.clone().unwrap_or_default();
        if !result.success {
            warn!(
                agent_id = ?correlation.agent_id,
                tool_name = %tool_name,
                tick = correlation.tick,
                error = ?result.error,
                "Tool call failed"
            );
        }
        self.coordinator.events_mut().emit(
            kinds::TOOL_COMPLETED,
            json!({
                "agent_id": correlation.agent_id,
                "tool": tool_name,
                "origin_tick": correlation.tick,
                "request_id": correlation.request_id.to_string(),
                "success": result.success,
                "error": result.error,
            }),
        );
        world.tool_completed(&ToolCompletion {
            agent_id: correlation.agent_id.clone(),
            tool_name,
            tick: correlation.tick,
            request_id: Some(correlation.request_id),
            result,
        });
    }
}
