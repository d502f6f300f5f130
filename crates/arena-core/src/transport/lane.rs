//! Single-flight FIFO lane.

use std::collections::VecDeque;

use arena_types::RequestId;

use super::PendingRequest;

/// One channel's request slot plus its backlog.
///
/// At most one request is in flight; everything else waits in submission
/// order. The lane only stores requests; sending them is the transport's job.
#[derive(Debug, Default)]
pub(crate) struct Lane {
    in_flight: Option<PendingRequest>,
    queue: VecDeque<PendingRequest>,
}

impl Lane {
    /// Whether a request is currently in flight.
    pub(crate) const fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub(crate) const fn in_flight(&self) -> Option<&PendingRequest> {
        self.in_flight.as_ref()
    }

    pub(crate) fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Append to the backlog and return the 1-based queue position.
    pub(crate) fn enqueue(&mut self, request: PendingRequest) -> usize {
        self.queue.push_back(request);
        self.queue.len()
    }

    /// Take the oldest queued request, if any.
    pub(crate) fn pop_next(&mut self) -> Option<PendingRequest> {
        self.queue.pop_front()
    }

    pub(crate) fn mark_in_flight(&mut self, request: PendingRequest) {
        self.in_flight = Some(request);
    }

    /// Take the in-flight request if it is the one with `id`.
    pub(crate) fn finish(&mut self, id: RequestId) -> Option<PendingRequest> {
        if self.in_flight.as_ref().is_some_and(|r| r.id == id) {
            self.in_flight.take()
        } else {
            None
        }
    }

    /// Whether `id` is the in-flight request.
    pub(crate) fn owns(&self, id: RequestId) -> bool {
        self.in_flight.as_ref().is_some_and(|r| r.id == id)
    }

    /// Empty the lane, returning the in-flight request and the backlog.
    pub(crate) fn abandon(&mut self) -> (Option<PendingRequest>, Vec<PendingRequest>) {
        (self.in_flight.take(), self.queue.drain(..).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::transport::Channel;

    fn pending(tick: u64) -> PendingRequest {
        PendingRequest {
            id: RequestId::new(),
            channel: Channel::Tool,
            agent_id: None,
            tool_name: Some("idle".to_owned()),
            tick,
            payload: json!({}),
        }
    }

    #[test]
    fn queue_is_fifo() {
        let mut lane = Lane::default();
        assert_eq!(lane.enqueue(pending(1)), 1);
        assert_eq!(lane.enqueue(pending(2)), 2);
        assert_eq!(lane.pop_next().unwrap().tick, 1);
        assert_eq!(lane.pop_next().unwrap().tick, 2);
        assert!(lane.pop_next().is_none());
    }

    #[test]
    fn finish_only_matches_in_flight_id() {
        let mut lane = Lane::default();
        let request = pending(1);
        let id = request.id;
        lane.mark_in_flight(request);
        assert!(lane.finish(RequestId::new()).is_none());
        assert!(lane.is_busy());
        assert_eq!(lane.finish(id).unwrap().id, id);
        assert!(!lane.is_busy());
    }

    #[test]
    fn abandon_empties_everything() {
        let mut lane = Lane::default();
        lane.mark_in_flight(pending(1));
        lane.enqueue(pending(2));
        lane.enqueue(pending(3));
        let (in_flight, queued) = lane.abandon();
        assert_eq!(in_flight.unwrap().tick, 1);
        assert_eq!(queued.len(), 2);
        assert!(!lane.is_busy());
        assert_eq!(lane.queued_len(), 0);
    }
}
