//! The process-boundary primitive underneath the transport.
//!
//! A [`Wire`] only knows how to fire a request and, some time later, report
//! a [`Completion`] for it. It never blocks the caller and never touches
//! transport state: completions are delivered back to the simulation loop,
//! which hands them to [`Transport::on_completion`].
//!
//! The engine provides an HTTP implementation. [`RecordingWire`] is an
//! in-memory implementation whose completions are produced by the caller,
//! used to drive the transport deterministically.
//!
//! [`Transport::on_completion`]: super::Transport::on_completion

use arena_types::RequestId;
use serde_json::Value;
use tokio::sync::mpsc;

/// HTTP-style method of an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Body-less read, used by the health probe.
    Get,
    /// Request with a JSON body.
    Post,
}

/// One request handed to the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    /// Correlation key; the matching [`Completion`] carries it back.
    pub id: RequestId,
    /// Request method.
    pub method: Method,
    /// Absolute target URL.
    pub url: String,
    /// JSON body for `Post`.
    pub body: Option<Value>,
}

/// Raw response as received from the other side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    /// Status code.
    pub status: u16,
    /// Unparsed body bytes.
    pub body: Vec<u8>,
}

impl WireResponse {
    /// Build a response from a status and a JSON value.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            body: body.to_string().into_bytes(),
        }
    }

    /// Whether the status is in the 2xx class.
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// The body as text, for error messages.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Failure reported by the wire itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// The wire cannot issue requests yet.
    #[error("wire is not ready to send")]
    NotReady,

    /// The request never produced a response (refused, reset, DNS, ...).
    #[error("request failed: {0}")]
    Io(String),

    /// The underlying transport gave up waiting.
    #[error("request timed out")]
    Timeout,
}

/// The outcome of one [`Outbound`] request.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// The request this completes.
    pub id: RequestId,
    /// Response or failure.
    pub outcome: Result<WireResponse, WireError>,
}

impl Completion {
    /// A completion carrying a response.
    pub const fn response(id: RequestId, response: WireResponse) -> Self {
        Self {
            id,
            outcome: Ok(response),
        }
    }

    /// A completion carrying a failure.
    pub const fn failure(id: RequestId, error: WireError) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }
}

/// Non-blocking request primitive.
pub trait Wire: Send {
    /// Whether the wire is initialised and able to send.
    fn is_ready(&self) -> bool;

    /// Start sending `outbound`. Must return without waiting for a response.
    ///
    /// An `Err` means nothing was sent and no completion will follow.
    fn send(&mut self, outbound: Outbound) -> Result<(), WireError>;

    /// Abandon an in-flight request. No completion is expected afterwards,
    /// and any that still arrives is ignored by the transport.
    fn cancel(&mut self, id: RequestId);
}

/// In-memory wire that forwards every outbound request to a channel.
///
/// Whoever holds the receiver plays the remote side and feeds
/// [`Completion`]s back into the transport by hand. Cancellations are
/// reported on a second channel when asked for with
/// [`reporting_cancellations`](Self::reporting_cancellations).
#[derive(Debug)]
pub struct RecordingWire {
    sent: mpsc::UnboundedSender<Outbound>,
    cancelled: Option<mpsc::UnboundedSender<RequestId>>,
    ready: bool,
    refuse_sends: bool,
}

impl RecordingWire {
    /// Create a ready wire and the receiver of everything it sends.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (sent, rx) = mpsc::unbounded_channel();
        (
            Self {
                sent,
                cancelled: None,
                ready: true,
                refuse_sends: false,
            },
            rx,
        )
    }

    /// Mark the wire as not yet initialised.
    #[must_use]
    pub const fn not_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    /// Make every `send` fail synchronously.
    #[must_use]
    pub const fn refusing_sends(mut self) -> Self {
        self.refuse_sends = true;
        self
    }

    /// Report every cancelled request id on the returned receiver.
    #[must_use]
    pub fn reporting_cancellations(mut self) -> (Self, mpsc::UnboundedReceiver<RequestId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.cancelled = Some(tx);
        (self, rx)
    }
}

impl Wire for RecordingWire {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn send(&mut self, outbound: Outbound) -> Result<(), WireError> {
        if !self.ready {
            return Err(WireError::NotReady);
        }
        if self.refuse_sends {
            return Err(WireError::Io("connection refused".to_owned()));
        }
        self.sent
            .send(outbound)
            .map_err(|e| WireError::Io(format!("recording receiver dropped: {e}")))
    }

    fn cancel(&mut self, id: RequestId) {
        if let Some(cancelled) = &self.cancelled {
            // A dropped receiver means nobody is watching.
            let _ = cancelled.send(id);
        }
    }
}
