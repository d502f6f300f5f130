//! Handle to a tool call whose result has not arrived yet.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use arena_types::{RequestId, ToolResult};
use tokio::sync::oneshot;

/// Pending tool call.
///
/// Returned the moment a tool call is accepted onto the tool lane. The
/// immediate [`acknowledgment`](Self::acknowledgment) only says the call was
/// queued; awaiting the ticket yields the tool's actual result.
///
/// If the call is abandoned (for example by a disconnect) the ticket
/// resolves to a failed [`ToolResult`] instead of hanging.
#[derive(Debug)]
#[must_use = "a ToolTicket does nothing unless awaited or inspected"]
pub struct ToolTicket {
    request_id: RequestId,
    result: oneshot::Receiver<ToolResult>,
}

impl ToolTicket {
    pub(crate) const fn new(request_id: RequestId, result: oneshot::Receiver<ToolResult>) -> Self {
        Self { request_id, result }
    }

    /// Transport correlation id of the call.
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// The "accepted" placeholder. Not the tool's result.
    pub fn acknowledgment(&self) -> ToolResult {
        let mut ack = ToolResult::accepted();
        ack.data.insert(
            "request_id".to_owned(),
            serde_json::Value::String(self.request_id.to_string()),
        );
        ack
    }

    /// The result, if it has already landed.
    ///
    /// Returns `None` while the call is still pending.
    pub fn try_result(&mut self) -> Option<ToolResult> {
        match self.result.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(cancelled()),
        }
    }
}

impl Future for ToolTicket {
    type Output = ToolResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.result)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| cancelled()))
    }
}

fn cancelled() -> ToolResult {
    ToolResult::failure("tool call cancelled before a result arrived")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures::FutureExt;
    use serde_json::Map;

    use super::*;

    #[test]
    fn acknowledgment_is_accepted_with_request_id() {
        let (_tx, rx) = oneshot::channel();
        let id = RequestId::new();
        let ticket = ToolTicket::new(id, rx);
        let ack = ticket.acknowledgment();
        assert!(ack.success);
        assert_eq!(ack.data["status"], "accepted");
        assert_eq!(ack.data["request_id"], id.to_string());
    }

    #[test]
    fn resolves_to_delivered_result() {
        let (tx, rx) = oneshot::channel();
        let ticket = ToolTicket::new(RequestId::new(), rx);
        tx.send(ToolResult::ok(Map::new())).unwrap();
        let result = ticket.now_or_never().unwrap();
        assert!(result.success);
    }

    #[test]
    fn dropped_sender_resolves_to_failure() {
        let (tx, rx) = oneshot::channel::<ToolResult>();
        let mut ticket = ToolTicket::new(RequestId::new(), rx);
        assert!(ticket.try_result().is_none());
        drop(tx);
        let result = ticket.try_result().unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("cancelled"));
    }
}
