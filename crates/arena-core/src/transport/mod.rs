//! Process-boundary transport to the decision backend.
//!
//! The [`Transport`] owns two independent lanes:
//!
//! - [`Channel::Tick`] -- observation out, [`Decision`] back
//! - [`Channel::Tool`] -- tool call out, [`ToolResult`] back
//!
//! Each lane is single-flight: while one request is outstanding, further
//! requests wait in FIFO order. When the in-flight request completes, whether
//! it succeeded, failed, or timed out, the next queued request is sent.
//!
//! The transport never waits for an answer. Requests go out through a
//! [`Wire`]; the wire later reports a [`Completion`], which the owner of the
//! transport feeds back through [`Transport::on_completion`]. Outcomes are
//! published as [`TransportEvent`]s on an injected channel, each carrying the
//! [`Correlation`] of the request that caused it. Correlation is taken from
//! the stored [`PendingRequest`], never from the response body.
//!
//! # Connection state
//!
//! ```text
//! Disconnected --connect()--> Connecting --probe ok-----> Connected
//!                             Connecting --probe fails--> Failed
//! any state --disconnect()--> Disconnected
//! ```
//!
//! There is no automatic retry after `Failed`.

mod lane;
mod ticket;
pub mod wire;

use std::collections::HashMap;
use std::fmt;

use arena_types::{AgentId, Decision, DecisionPayload, RequestId, Tick, ToolRequest, ToolResult};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use self::lane::Lane;
pub use self::ticket::ToolTicket;
pub use self::wire::{
    Completion, Method, Outbound, RecordingWire, Wire, WireError, WireResponse,
};

/// A logical request/response lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Observation exchange: fetch a decision for an observation.
    Tick,
    /// Tool execution: carry out a decision's action.
    Tool,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tick => f.write_str("tick"),
            Self::Tool => f.write_str("tool"),
        }
    }
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No target configured.
    Disconnected,
    /// Health probe outstanding.
    Connecting,
    /// Health probe succeeded.
    Connected,
    /// Health probe failed.
    Failed,
}

/// Paths appended to the base URL for each kind of request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Health probe path.
    pub health_path: String,
    /// Tick lane path.
    pub tick_path: String,
    /// Tool lane path.
    pub tool_path: String,
}

impl Endpoints {
    const fn path(&self, channel: Channel) -> &String {
        match channel {
            Channel::Tick => &self.tick_path,
            Channel::Tool => &self.tool_path,
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            health_path: "/health".to_owned(),
            tick_path: "/tick".to_owned(),
            tool_path: "/tools/execute".to_owned(),
        }
    }
}

/// What a caller asks the transport to send.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    /// Lane to send on.
    pub channel: Channel,
    /// Agent the request is for, if any.
    pub agent_id: Option<AgentId>,
    /// Tool the request concerns, if any.
    pub tool_name: Option<String>,
    /// Tick the request is attributed to.
    pub tick: Tick,
    /// JSON body.
    pub payload: Value,
}

/// A request owned by the transport, either in flight or queued.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    /// Correlation key.
    pub id: RequestId,
    /// Lane the request belongs to.
    pub channel: Channel,
    /// Agent the request is for, if any.
    pub agent_id: Option<AgentId>,
    /// Tool the request concerns, if any.
    pub tool_name: Option<String>,
    /// Tick the request is attributed to.
    pub tick: Tick,
    /// JSON body.
    pub payload: Value,
}

impl PendingRequest {
    fn from_spec(spec: RequestSpec) -> Self {
        Self {
            id: RequestId::new(),
            channel: spec.channel,
            agent_id: spec.agent_id,
            tool_name: spec.tool_name,
            tick: spec.tick,
            payload: spec.payload,
        }
    }

    /// The attribution carried by every notification about this request.
    pub fn correlation(&self) -> Correlation {
        Correlation {
            request_id: self.id,
            channel: self.channel,
            agent_id: self.agent_id.clone(),
            tool_name: self.tool_name.clone(),
            tick: self.tick,
        }
    }
}

/// Attribution of a response to the request that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    /// The originating request.
    pub request_id: RequestId,
    /// Lane the request travelled on.
    pub channel: Channel,
    /// Agent the request was for.
    pub agent_id: Option<AgentId>,
    /// Tool the request concerned.
    pub tool_name: Option<String>,
    /// Tick the request was attributed to.
    pub tick: Tick,
}

/// Parsed body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Tick lane answer.
    Decision(Decision),
    /// Tool lane answer.
    Tool(ToolResult),
}

/// Notifications published by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The health probe succeeded.
    Connected {
        /// Base URL that answered.
        url: String,
    },
    /// The health probe failed.
    ConnectionFailed {
        /// Why it failed; never empty.
        reason: String,
    },
    /// A request completed with a well-formed response.
    ResponseReceived {
        /// The originating request.
        correlation: Correlation,
        /// The parsed response.
        body: ResponseBody,
    },
    /// A request completed without a usable response.
    RequestFailed {
        /// The originating request.
        correlation: Correlation,
        /// What went wrong.
        error: TransportError,
    },
}

/// How a request was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Handed to the wire immediately.
    Issued(RequestId),
    /// Waiting behind an in-flight request.
    Queued {
        /// Correlation key of the queued request.
        id: RequestId,
        /// 1-based position in the lane's backlog.
        position: usize,
    },
}

impl Submission {
    /// Correlation key of the submitted request.
    pub const fn id(&self) -> RequestId {
        match self {
            Self::Issued(id) | Self::Queued { id, .. } => *id,
        }
    }

    /// Whether the request is waiting in the backlog.
    pub const fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }
}

/// Transport failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The wire is not initialised yet.
    #[error("transport is not ready: the underlying wire is not initialised")]
    NotReady,

    /// `connect` was given an unusable URL.
    #[error("invalid backend url: {url:?}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
    },

    /// A request was made with no target configured.
    #[error("not connected to a decision backend")]
    NotConnected,

    /// The request did not produce a response.
    #[error("connection error: {reason}")]
    Connection {
        /// Failure reported by the wire.
        reason: String,
    },

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {status}: {body}")]
    Http {
        /// Response status.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The backend answered with a body that could not be understood.
    #[error("malformed response: {message}")]
    Parse {
        /// Parser diagnostic.
        message: String,
    },
}

/// Owner of the process-boundary lanes and the connection state.
pub struct Transport {
    wire: Box<dyn Wire>,
    endpoints: Endpoints,
    notifications: mpsc::UnboundedSender<TransportEvent>,
    state: ConnectionState,
    url: Option<String>,
    probe: Option<RequestId>,
    tick_lane: Lane,
    tool_lane: Lane,
    tool_waiters: HashMap<RequestId, oneshot::Sender<ToolResult>>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("state", &self.state)
            .field("url", &self.url)
            .field("tick_lane", &self.tick_lane)
            .field("tool_lane", &self.tool_lane)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Create a disconnected transport.
    ///
    /// Every [`TransportEvent`] is sent to `notifications`.
    pub fn new(
        wire: Box<dyn Wire>,
        endpoints: Endpoints,
        notifications: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            wire,
            endpoints,
            notifications,
            state: ConnectionState::Disconnected,
            url: None,
            probe: None,
            tick_lane: Lane::default(),
            tool_lane: Lane::default(),
            tool_waiters: HashMap::new(),
        }
    }

    /// Current connection state.
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Base URL of the backend, once `connect` has been called.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// The request currently in flight on `channel`.
    pub const fn in_flight(&self, channel: Channel) -> Option<&PendingRequest> {
        self.lane(channel).in_flight()
    }

    /// Number of requests waiting on `channel`.
    pub fn queued_len(&self, channel: Channel) -> usize {
        self.lane(channel).queued_len()
    }

    /// Point the transport at `url` and probe its health.
    ///
    /// Moves to [`ConnectionState::Connecting`]. The probe's outcome
    /// arrives later as [`TransportEvent::Connected`] or
    /// [`TransportEvent::ConnectionFailed`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotReady`] if the wire is not initialised
    /// and [`TransportError::InvalidUrl`] for an empty URL. The state is
    /// left unchanged in both cases.
    pub fn connect(&mut self, url: &str) -> Result<(), TransportError> {
        let base = url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(TransportError::InvalidUrl {
                url: url.to_owned(),
            });
        }
        if !self.wire.is_ready() {
            warn!(url = base, "Connect attempted before the wire was ready");
            return Err(TransportError::NotReady);
        }
        if let Some(stale) = self.probe.take() {
            self.wire.cancel(stale);
        }

        self.url = Some(base.to_owned());
        self.state = ConnectionState::Connecting;
        let id = RequestId::new();
        let probe = Outbound {
            id,
            method: Method::Get,
            url: format!("{base}{}", self.endpoints.health_path),
            body: None,
        };
        info!(url = base, "Probing decision backend");
        match self.wire.send(probe) {
            Ok(()) => self.probe = Some(id),
            Err(e) => self.connection_failed(e.to_string()),
        }
        Ok(())
    }

    /// Drop the connection.
    ///
    /// The in-flight request on each lane is cancelled and queued requests
    /// are discarded. None of them produce a notification. Pending
    /// [`ToolTicket`]s resolve to a cancellation failure.
    pub fn disconnect(&mut self) {
        if let Some(probe) = self.probe.take() {
            self.wire.cancel(probe);
        }
        let mut dropped = 0_usize;
        for channel in [Channel::Tick, Channel::Tool] {
            let (in_flight, queued) = self.lane_mut(channel).abandon();
            if let Some(request) = in_flight {
                self.wire.cancel(request.id);
                dropped = dropped.saturating_add(1);
            }
            dropped = dropped.saturating_add(queued.len());
        }
        self.tool_waiters.clear();
        if self.state != ConnectionState::Disconnected {
            info!(url = ?self.url, dropped, "Disconnected from decision backend");
        }
        self.url = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Submit a request on its channel.
    ///
    /// Sent at once if the channel is idle, otherwise queued. Never
    /// rejected: a request that cannot be sent produces a
    /// [`TransportEvent::RequestFailed`] and the lane moves on.
    pub fn request(&mut self, spec: RequestSpec) -> Submission {
        self.submit(PendingRequest::from_spec(spec))
    }

    /// Submit a tool call on the tool lane.
    ///
    /// Returns straight away. The ticket's acknowledgment is only an
    /// "accepted" placeholder; the real result is delivered to the ticket
    /// and, as a [`TransportEvent`], to the notification channel.
    pub fn request_tool_execution(&mut self, call: ToolCall) -> ToolTicket {
        let payload = ToolRequest {
            tool_name: call.tool_name.clone(),
            params: call.params,
            agent_id: call
                .agent_id
                .as_ref()
                .map(|a| a.as_str().to_owned())
                .unwrap_or_default(),
            tick: call.tick,
        };
        let payload = serde_json::to_value(&payload).unwrap_or(Value::Null);

        let pending = PendingRequest::from_spec(RequestSpec {
            channel: Channel::Tool,
            agent_id: call.agent_id,
            tool_name: Some(call.tool_name),
            tick: call.tick,
            payload,
        });
        let id = pending.id;

        // Registered before submitting: a synchronous send failure resolves
        // the waiter inside `submit`.
        let (tx, rx) = oneshot::channel();
        self.tool_waiters.insert(id, tx);
        self.submit(pending);
        ToolTicket::new(id, rx)
    }

    /// Handle a completion reported by the wire.
    ///
    /// Publishes exactly one notification for the completed request, then
    /// sends the next queued request on the same lane. Completions for
    /// unknown or cancelled requests are ignored.
    pub fn on_completion(&mut self, completion: Completion) {
        if self.probe == Some(completion.id) {
            self.probe = None;
            self.on_probe_result(completion.outcome);
            return;
        }

        let Some(channel) = self.channel_of(completion.id) else {
            debug!(request_id = %completion.id, "Ignoring completion for unknown request");
            return;
        };
        let Some(pending) = self.lane_mut(channel).finish(completion.id) else {
            return;
        };

        match completion.outcome {
            Ok(response) if response.is_success() => self.on_response(&pending, &response.body),
            Ok(response) => self.fail(
                &pending.correlation(),
                TransportError::Http {
                    status: response.status,
                    body: response.body_text(),
                },
            ),
            Err(e) => self.fail(
                &pending.correlation(),
                TransportError::Connection {
                    reason: e.to_string(),
                },
            ),
        }

        if let Some(next) = self.lane_mut(channel).pop_next() {
            self.launch(next);
        }
    }

    fn submit(&mut self, pending: PendingRequest) -> Submission {
        let channel = pending.channel;
        let id = pending.id;

        if self.lane(channel).is_busy() {
            let position = self.lane_mut(channel).enqueue(pending);
            debug!(
                %channel,
                request_id = %id,
                position,
                "Channel busy, request queued"
            );
            return Submission::Queued { id, position };
        }

        self.launch(pending);
        Submission::Issued(id)
    }

    /// Parse a success-class body and publish it with the request's
    /// correlation. A malformed body becomes a failed completion.
    fn on_response(&mut self, pending: &PendingRequest, raw: &[u8]) {
        let correlation = pending.correlation();
        let parsed = match pending.channel {
            Channel::Tick => serde_json::from_slice::<DecisionPayload>(raw)
                .map_err(|e| TransportError::Parse {
                    message: e.to_string(),
                })
                .and_then(|payload| {
                    payload
                        .into_decision_for(pending.agent_id.as_ref())
                        .ok_or_else(|| TransportError::Parse {
                            message: "response holds no action for the requesting agent"
                                .to_owned(),
                        })
                })
                .map(ResponseBody::Decision),
            Channel::Tool => serde_json::from_slice::<ToolResult>(raw)
                .map_err(|e| TransportError::Parse {
                    message: e.to_string(),
                })
                .map(ResponseBody::Tool),
        };

        match parsed {
            Ok(body) => {
                if let ResponseBody::Tool(result) = &body {
                    self.resolve_waiter(correlation.request_id, result.clone());
                }
                debug!(
                    channel = %correlation.channel,
                    request_id = %correlation.request_id,
                    agent_id = ?correlation.agent_id,
                    tick = correlation.tick,
                    "Response received"
                );
                self.publish(TransportEvent::ResponseReceived { correlation, body });
            }
            Err(error) => self.fail(&correlation, error),
        }
    }

    fn on_probe_result(&mut self, outcome: Result<WireResponse, WireError>) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        match outcome {
            Ok(response) if response.is_success() => {
                let url = self.url.clone().unwrap_or_default();
                info!(url = %url, "Connected to decision backend");
                self.state = ConnectionState::Connected;
                self.publish(TransportEvent::Connected { url });
            }
            Ok(response) => {
                self.connection_failed(format!("health probe returned HTTP {}", response.status));
            }
            Err(e) => self.connection_failed(e.to_string()),
        }
    }

    fn connection_failed(&mut self, reason: String) {
        let reason = if reason.is_empty() {
            "health probe failed".to_owned()
        } else {
            reason
        };
        warn!(url = ?self.url, reason = %reason, "Connection to decision backend failed");
        self.state = ConnectionState::Failed;
        self.publish(TransportEvent::ConnectionFailed { reason });
    }

    /// Send `pending`, or fail it and keep draining until something is
    /// actually in flight or the lane is empty.
    fn launch(&mut self, pending: PendingRequest) {
        let channel = pending.channel;
        let mut next = Some(pending);
        while let Some(pending) = next.take() {
            match self.send(&pending) {
                Ok(()) => {
                    self.lane_mut(channel).mark_in_flight(pending);
                    return;
                }
                Err(error) => {
                    self.fail(&pending.correlation(), error);
                    next = self.lane_mut(channel).pop_next();
                }
            }
        }
    }

    fn send(&mut self, pending: &PendingRequest) -> Result<(), TransportError> {
        let Some(base) = self.url.as_deref() else {
            return Err(TransportError::NotConnected);
        };
        if !self.wire.is_ready() {
            return Err(TransportError::NotReady);
        }
        let outbound = Outbound {
            id: pending.id,
            method: Method::Post,
            url: format!("{base}{}", self.endpoints.path(pending.channel)),
            body: Some(pending.payload.clone()),
        };
        self.wire
            .send(outbound)
            .map_err(|e| TransportError::Connection {
                reason: e.to_string(),
            })
    }

    fn fail(&mut self, correlation: &Correlation, error: TransportError) {
        warn!(
            channel = %correlation.channel,
            request_id = %correlation.request_id,
            agent_id = ?correlation.agent_id,
            tool_name = ?correlation.tool_name,
            tick = correlation.tick,
            error = %error,
            "Request failed"
        );
        if correlation.channel == Channel::Tool {
            self.resolve_waiter(correlation.request_id, ToolResult::failure(error.to_string()));
        }
        self.publish(TransportEvent::RequestFailed {
            correlation: correlation.clone(),
            error,
        });
    }

    fn resolve_waiter(&mut self, id: RequestId, result: ToolResult) {
        if let Some(waiter) = self.tool_waiters.remove(&id) {
            // The ticket may have been dropped; the notification still goes out.
            let _ = waiter.send(result);
        }
    }

    fn publish(&self, event: TransportEvent) {
        if self.notifications.send(event).is_err() {
            debug!("Transport notification dropped: no listener");
        }
    }

    fn channel_of(&self, id: RequestId) -> Option<Channel> {
        [Channel::Tick, Channel::Tool]
            .into_iter()
            .find(|channel| self.lane(*channel).owns(id))
    }

    const fn lane(&self, channel: Channel) -> &Lane {
        match channel {
            Channel::Tick => &self.tick_lane,
            Channel::Tool => &self.tool_lane,
        }
    }

    const fn lane_mut(&mut self, channel: Channel) -> &mut Lane {
        match channel {
            Channel::Tick => &mut self.tick_lane,
            Channel::Tool => &mut self.tool_lane,
        }
    }
}

/// A tool invocation routed through the tool lane.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Tool to run.
    pub tool_name: String,
    /// Tool parameters.
    pub params: Value,
    /// Agent the call is made for, if any.
    pub agent_id: Option<AgentId>,
    /// Tick the call is attributed to.
    pub tick: Tick,
}

impl ToolCall {
    /// A call made by scene logic rather than on behalf of an agent.
    pub fn new(tool_name: impl Into<String>, params: Value, tick: Tick) -> Self {
        Self {
            tool_name: tool_name.into(),
            params,
            agent_id: None,
            tick,
        }
    }

    /// Attribute the call to `agent`.
    #[must_use]
    pub fn for_agent(mut self, agent: AgentId) -> Self {
        self.agent_id = Some(agent);
        self
    }
}
