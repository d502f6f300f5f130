//! End-to-end scenarios for the tick pipeline, driven through an in-memory
//! wire whose responses are scripted by the test.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use arena_core::transport::{Outbound, RecordingWire, RequestSpec, WireError, WireResponse};
use arena_core::{
    ActionRegistry, Arena, ArenaParts, Channel, Completion, ConnectionState, Endpoints, GameWorld,
    TickCoordinator, ToolCall, ToolCompletion, ToolSchema, Transport, TransportEvent,
};
use arena_events::EventLog;
use arena_types::{AgentId, Observation, Tick, kinds};
use serde_json::{Value, json};
use tokio::sync::mpsc;

// =========================================================================
// Harness
// =========================================================================

#[derive(Default)]
struct ScriptedWorld {
    agents: Vec<AgentId>,
    completions: Vec<ToolCompletion>,
}

impl ScriptedWorld {
    fn with_agents(ids: &[&str]) -> Self {
        Self {
            agents: ids.iter().map(|id| AgentId::from(*id)).collect(),
            completions: Vec::new(),
        }
    }
}

impl GameWorld for ScriptedWorld {
    fn observe(&mut self, tick: Tick) -> Vec<Observation> {
        self.agents
            .iter()
            .map(|agent| Observation::new(agent.clone(), tick, [0.0, 0.0, 0.0]))
            .collect()
    }

    fn tool_completed(&mut self, completion: &ToolCompletion) {
        self.completions.push(completion.clone());
    }
}

fn registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register("idle", ToolSchema::new("Do nothing"));
    registry.register(
        "move_to",
        ToolSchema::new("Move").with_parameters(json!({"required": ["target_position"]})),
    );
    registry.register(
        "collect",
        ToolSchema::new("Collect").with_parameters(json!({"required": ["target_name"]})),
    );
    registry
}

/// A started arena connected to a scripted backend.
fn connected_arena(world: &mut ScriptedWorld) -> (Arena, mpsc::UnboundedReceiver<Outbound>) {
    let (wire, mut sent) = RecordingWire::new();
    let mut arena = Arena::new(ArenaParts {
        coordinator: TickCoordinator::new(EventLog::new()),
        registry: registry(),
        wire: Box::new(wire),
        endpoints: Endpoints::default(),
    });
    arena.coordinator_mut().start();
    arena.connect("http://backend:5000").unwrap();
    let probe = sent.try_recv().unwrap();
    arena.handle_completion(ok(&probe, &json!({"status": "ok"})), world);
    assert_eq!(arena.transport().state(), ConnectionState::Connected);
    (arena, sent)
}

fn ok(outbound: &Outbound, body: &Value) -> Completion {
    Completion::response(outbound.id, WireResponse::json(200, body))
}

fn events_of<'a>(arena: &'a Arena, kind: &str) -> Vec<&'a arena_types::Event> {
    arena
        .coordinator()
        .events()
        .events()
        .iter()
        .filter(|e| e.event_type == kind)
        .collect()
}

// =========================================================================
// Transport ordering
// =========================================================================

#[test]
fn queued_requests_resolve_in_submission_order_even_after_failures() {
    let (wire, mut sent) = RecordingWire::new();
    let (tx, mut events) = mpsc::unbounded_channel();
    let mut transport = Transport::new(Box::new(wire), Endpoints::default(), tx);
    transport.connect("http://backend").unwrap();
    let probe = sent.try_recv().unwrap();
    transport.on_completion(ok(&probe, &json!({})));
    events.try_recv().unwrap();

    let tickets: Vec<_> = (1..=4)
        .map(|tick| transport.request_tool_execution(ToolCall::new("idle", json!({}), tick)))
        .collect();
    assert_eq!(transport.queued_len(Channel::Tool), 3);

    // Answer whatever is on the wire: fail the odd ticks, succeed the even ones.
    for tick in 1..=4_u64 {
        let outbound = sent.try_recv().unwrap();
        assert_eq!(outbound.body.as_ref().unwrap()["tick"], tick);
        let completion = if tick % 2 == 1 {
            Completion::failure(outbound.id, WireError::Timeout)
        } else {
            ok(&outbound, &json!({"success": true}))
        };
        transport.on_completion(completion);
    }
    assert!(sent.try_recv().is_err());

    let ticks: Vec<Tick> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|event| match event {
            TransportEvent::ResponseReceived { correlation, .. }
            | TransportEvent::RequestFailed { correlation, .. } => correlation.tick,
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(ticks, vec![1, 2, 3, 4]);

    for (i, mut ticket) in tickets.into_iter().enumerate() {
        let result = ticket.try_result().unwrap();
        assert_eq!(result.success, i % 2 == 1);
    }
}

#[test]
fn every_request_gets_exactly_one_correlated_notification() {
    let (wire, mut sent) = RecordingWire::new();
    let (tx, mut events) = mpsc::unbounded_channel();
    let mut transport = Transport::new(Box::new(wire), Endpoints::default(), tx);
    transport.connect("http://backend").unwrap();
    let probe = sent.try_recv().unwrap();
    transport.on_completion(ok(&probe, &json!({})));
    events.try_recv().unwrap();

    // Interleave both lanes: tool calls and tick requests for three agents.
    let mut expected = Vec::new();
    for (i, agent) in ["a", "b", "c"].into_iter().enumerate() {
        let tick = u64::try_from(i).unwrap() + 1;
        let call = ToolCall::new("idle", json!({}), tick).for_agent(AgentId::from(agent));
        let _ = transport.request_tool_execution(call);
        expected.push((agent.to_owned(), Some("idle".to_owned()), tick));
        transport.request(RequestSpec {
            channel: Channel::Tick,
            agent_id: Some(AgentId::from(agent)),
            tool_name: None,
            tick,
            payload: json!({}),
        });
        expected.push((agent.to_owned(), None, tick));
    }

    // The backend answers with bodies that would mislead any body-based
    // attribution.
    while let Ok(outbound) = sent.try_recv() {
        let body = if outbound.url.ends_with("/tick") {
            json!({"tool": "idle", "params": {}, "agent_id": "nobody"})
        } else {
            json!({"success": true, "agent_id": "nobody", "tick": 999})
        };
        transport.on_completion(ok(&outbound, &body));
    }

    let mut seen: Vec<(String, Option<String>, Tick)> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|event| match event {
            TransportEvent::ResponseReceived { correlation, .. } => (
                correlation.agent_id.unwrap().as_str().to_owned(),
                correlation.tool_name,
                correlation.tick,
            ),
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    seen.sort();
    expected.sort();
    assert_eq!(seen, expected);
}

// =========================================================================
// Tick coordinator
// =========================================================================

#[test]
fn reset_with_requests_in_flight_discards_their_decisions() {
    let mut world = ScriptedWorld::with_agents(&["a"]);
    let (mut arena, mut sent) = connected_arena(&mut world);

    arena.advance(&mut world);
    arena.advance(&mut world);
    assert_eq!(arena.coordinator().tick(), 2);
    let in_flight = sent.try_recv().unwrap();

    arena.reset();
    assert_eq!(arena.coordinator().tick(), 0);
    assert!(arena.coordinator().events().is_empty());
    assert!(!arena.coordinator().is_running());

    arena.coordinator_mut().start();
    arena.handle_completion(
        ok(&in_flight, &json!({"tool": "idle", "params": {}})),
        &mut world,
    );
    assert!(events_of(&arena, kinds::DECISION_APPLIED).is_empty());
    assert!(arena.transport().in_flight(Channel::Tool).is_none());
}

#[test]
fn events_outside_recording_are_never_observable() {
    let mut world = ScriptedWorld::default();
    let (mut arena, _sent) = connected_arena(&mut world);
    arena.coordinator_mut().stop();
    arena.advance(&mut world);
    arena.coordinator_mut().events_mut().emit("ghost", json!({}));
    assert!(arena.coordinator().events().events_for_tick(1).is_empty());
    assert!(
        arena
            .coordinator()
            .events()
            .export()
            .iter()
            .all(|e| e.event_type != "ghost")
    );
}

// =========================================================================
// Scenarios
// =========================================================================

#[test]
fn unreachable_backend_moves_to_failed_with_reason() {
    let mut world = ScriptedWorld::default();
    let (wire, mut sent) = RecordingWire::new();
    let mut arena = Arena::new(ArenaParts {
        coordinator: TickCoordinator::new(EventLog::new()),
        registry: registry(),
        wire: Box::new(wire),
        endpoints: Endpoints::default(),
    });
    arena.coordinator_mut().start();
    assert_eq!(arena.transport().state(), ConnectionState::Disconnected);

    arena.connect("http://127.0.0.1:1").unwrap();
    assert_eq!(arena.transport().state(), ConnectionState::Connecting);

    let probe = sent.try_recv().unwrap();
    arena.handle_completion(
        Completion::failure(probe.id, WireError::Io("connection refused".to_owned())),
        &mut world,
    );
    assert_eq!(arena.transport().state(), ConnectionState::Failed);

    let failed = events_of(&arena, kinds::CONNECTION_FAILED);
    assert_eq!(failed.len(), 1);
    assert!(!failed[0].data["reason"].as_str().unwrap().is_empty());
}

#[test]
fn back_to_back_tool_calls_for_one_agent_are_serialized() {
    let mut world = ScriptedWorld::default();
    let (mut arena, mut sent) = connected_arena(&mut world);
    let agent = AgentId::from("forager");

    for _ in 0..5 {
        arena.coordinator_mut().step();
    }
    let move_to = arena
        .call_tool_for(agent.clone(), "move_to", json!({"target_position": [1.0, 0.0, 1.0]}))
        .unwrap();
    arena.coordinator_mut().step();
    let collect = arena
        .call_tool_for(agent, "collect", json!({"target_name": "berry_1"}))
        .unwrap();

    assert_eq!(arena.transport().queued_len(Channel::Tool), 1);
    let first = sent.try_recv().unwrap();
    assert_eq!(first.id, move_to.request_id());
    assert!(sent.try_recv().is_err(), "collect must wait for move_to");

    arena.handle_completion(ok(&first, &json!({"success": true})), &mut world);
    let second = sent.try_recv().unwrap();
    assert_eq!(second.id, collect.request_id());
    arena.handle_completion(ok(&second, &json!({"success": true})), &mut world);

    let order: Vec<(&str, Tick)> = world
        .completions
        .iter()
        .map(|c| (c.tool_name.as_str(), c.tick))
        .collect();
    assert_eq!(order, vec![("move_to", 5), ("collect", 6)]);
}

#[test]
fn late_decision_is_applied_against_its_origin_tick_and_next_dispatch_is_skipped() {
    let mut world = ScriptedWorld::with_agents(&["a"]);
    let (mut arena, mut sent) = connected_arena(&mut world);

    for _ in 0..9 {
        arena.coordinator_mut().step();
    }
    let tick_ten = arena.advance(&mut world);
    assert_eq!(tick_ten.tick, 10);
    assert_eq!(tick_ten.dispatch.dispatched.len(), 1);
    let request = sent.try_recv().unwrap();

    // Tick 11 begins before the tick 10 decision returns.
    let tick_eleven = arena.advance(&mut world);
    assert!(tick_eleven.dispatch.dispatched.is_empty());
    assert_eq!(tick_eleven.dispatch.skipped.len(), 1);
    assert_eq!(tick_eleven.dispatch.skipped[0].outstanding_tick, 10);
    assert_eq!(arena.transport().queued_len(Channel::Tick), 0);
    assert!(sent.try_recv().is_err());

    arena.handle_completion(
        ok(
            &request,
            &json!({"tool": "collect", "params": {"target_name": "berry_1"}, "reasoning": "close"}),
        ),
        &mut world,
    );

    let applied = events_of(&arena, kinds::DECISION_APPLIED);
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].data["origin_tick"], 10);
    assert_eq!(applied[0].data["tool"], "collect");

    // The tool call inherits the origin tick.
    let tool_request = sent.try_recv().unwrap();
    assert_eq!(tool_request.body.as_ref().unwrap()["tick"], 10);
    assert_eq!(tool_request.body.as_ref().unwrap()["agent_id"], "a");
    arena.handle_completion(ok(&tool_request, &json!({"success": true})), &mut world);
    assert_eq!(world.completions[0].tick, 10);

    // The agent is free again for tick 12.
    let tick_twelve = arena.advance(&mut world);
    assert_eq!(tick_twelve.dispatch.dispatched.len(), 1);
}

#[test]
fn one_agents_failure_does_not_stop_the_others() {
    let mut world = ScriptedWorld::with_agents(&["a", "b"]);
    let (mut arena, mut sent) = connected_arena(&mut world);

    arena.advance(&mut world);
    let first = sent.try_recv().unwrap();
    arena.handle_completion(
        Completion::response(first.id, WireResponse::json(500, &json!({"detail": "boom"}))),
        &mut world,
    );
    let second = sent.try_recv().unwrap();
    arena.handle_completion(ok(&second, &json!({"tool": "idle", "params": {}})), &mut world);

    assert_eq!(events_of(&arena, kinds::DECISION_FAILED).len(), 1);
    assert_eq!(events_of(&arena, kinds::DECISION_APPLIED).len(), 1);

    let next = arena.advance(&mut world);
    assert_eq!(next.tick, 2);
    // "a" was released by its failure, "b" by its decision.
    assert_eq!(next.dispatch.dispatched.len(), 2);
}

#[test]
fn recording_round_trips_through_export_and_load() {
    let mut world = ScriptedWorld::with_agents(&["a"]);
    let (mut arena, mut sent) = connected_arena(&mut world);
    arena.advance(&mut world);
    let request = sent.try_recv().unwrap();
    arena.handle_completion(ok(&request, &json!({"tool": "idle"})), &mut world);
    arena.coordinator_mut().stop();

    let exported = arena.coordinator().events().export();
    let mut replay = EventLog::new();
    replay.load(exported.clone());
    assert_eq!(replay.len(), exported.len());
    for (a, b) in exported.iter().zip(replay.events()) {
        assert!(a.same_replay_identity(b));
    }
    let ticks: Vec<Tick> = replay.replay().map(|(tick, _)| tick).collect();
    assert!(ticks.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn tool_ticket_resolves_once_the_result_lands() {
    use futures::FutureExt;

    let mut world = ScriptedWorld::default();
    let (mut arena, mut sent) = connected_arena(&mut world);
    let mut ticket = arena.call_tool("idle", json!({})).unwrap();
    assert_eq!(ticket.acknowledgment().data["status"], "accepted");
    assert!(ticket.try_result().is_none());

    let outbound = sent.try_recv().unwrap();
    arena.handle_completion(
        ok(&outbound, &json!({"success": true, "result": {"idled": true}})),
        &mut world,
    );
    let result = ticket.now_or_never().unwrap();
    assert!(result.success);
    assert_eq!(result.data["result"]["idled"], true);
    assert!(matches!(
        world.completions[0].result.data.get("result"),
        Some(Value::Object(_))
    ));
}
