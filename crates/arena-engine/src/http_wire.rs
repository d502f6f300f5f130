//! HTTP implementation of the transport's [`Wire`].
//!
//! [`HttpWire`] spawns one `tokio` task per outbound request. The task
//! performs the request with `reqwest` and reports the outcome on the
//! completion channel, which the simulation loop drains. The wire never
//! touches transport state, and `send` returns as soon as the task is
//! spawned.
//!
//! Request timeouts are enforced by the client; a timed-out request is
//! reported as [`WireError::Timeout`].

use std::collections::HashMap;
use std::time::Duration;

use arena_core::transport::{Completion, Method, Outbound, Wire, WireError, WireResponse};
use arena_types::RequestId;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Non-blocking HTTP wire backed by a shared `reqwest` client.
#[derive(Debug)]
pub struct HttpWire {
    client: reqwest::Client,
    completions: mpsc::UnboundedSender<Completion>,
    in_flight: HashMap<RequestId, JoinHandle<()>>,
}

impl HttpWire {
    /// Create a wire whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (for example if
    /// the TLS backend fails to initialise).
    pub fn new(
        timeout: Duration,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            completions,
            in_flight: HashMap::new(),
        })
    }

    /// Number of request tasks that have not finished yet.
    #[cfg(test)]
    fn active_requests(&self) -> usize {
        self.in_flight
            .values()
            .filter(|task| !task.is_finished())
            .count()
    }
}

impl Wire for HttpWire {
    fn is_ready(&self) -> bool {
        Handle::try_current().is_ok()
    }

    fn send(&mut self, outbound: Outbound) -> Result<(), WireError> {
        let Ok(runtime) = Handle::try_current() else {
            return Err(WireError::NotReady);
        };
        self.in_flight.retain(|_, task| !task.is_finished());

        let id = outbound.id;
        let client = self.client.clone();
        let completions = self.completions.clone();
        debug!(request_id = %id, url = %outbound.url, "Sending request");
        let task = runtime.spawn(async move {
            let outcome = perform(&client, outbound).await;
            // A closed channel means the loop is gone and nobody is waiting.
            let _ = completions.send(Completion { id, outcome });
        });
        self.in_flight.insert(id, task);
        Ok(())
    }

    fn cancel(&mut self, id: RequestId) {
        if let Some(task) = self.in_flight.remove(&id) {
            task.abort();
            debug!(request_id = %id, "Request cancelled");
        }
    }
}

impl Drop for HttpWire {
    fn drop(&mut self) {
        for task in self.in_flight.values() {
            task.abort();
        }
    }
}

async fn perform(client: &reqwest::Client, outbound: Outbound) -> Result<WireResponse, WireError> {
    let builder = match outbound.method {
        Method::Get => client.get(&outbound.url),
        Method::Post => {
            let builder = client.post(&outbound.url);
            match &outbound.body {
                Some(body) => builder.json(body),
                None => builder,
            }
        }
    };

    let response = builder.send().await.map_err(|e| classify(&e))?;
    let status = response.status().as_u16();
    let body = response.bytes().await.map_err(|e| classify(&e))?;
    Ok(WireResponse {
        status,
        body: body.to_vec(),
    })
}

fn classify(error: &reqwest::Error) -> WireError {
    if error.is_timeout() {
        WireError::Timeout
    } else {
        WireError::Io(error.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use arena_backend::{AppState, ForagingPolicy};
    use arena_core::transport::{ConnectionState, Endpoints, Transport, TransportEvent};
    use tokio::net::TcpListener;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn spawn_backend() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(AppState::new(ForagingPolicy::new(1)));
        tokio::spawn(arena_backend::serve(listener, state));
        format!("http://{addr}")
    }

    struct Rig {
        transport: Transport,
        completions: mpsc::UnboundedReceiver<Completion>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    }

    fn rig() -> Rig {
        let (done_tx, completions) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let wire = HttpWire::new(TIMEOUT, done_tx).unwrap();
        Rig {
            transport: Transport::new(Box::new(wire), Endpoints::default(), events_tx),
            completions,
            events,
        }
    }

    impl Rig {
        async fn pump_one(&mut self) {
            let completion = tokio::time::timeout(TIMEOUT, self.completions.recv())
                .await
                .unwrap()
                .unwrap();
            self.transport.on_completion(completion);
        }
    }

    #[tokio::test]
    async fn reaches_connected_against_loopback_backend() {
        let url = spawn_backend().await;
        let mut r = rig();

        r.transport.connect(&url).unwrap();
        assert_eq!(r.transport.state(), ConnectionState::Connecting);
        r.pump_one().await;

        assert_eq!(r.transport.state(), ConnectionState::Connected);
        assert!(matches!(
            r.events.try_recv().unwrap(),
            TransportEvent::Connected { .. }
        ));
    }

    #[tokio::test]
    async fn unreachable_backend_fails_with_reason() {
        // Bind then drop so the port is known to be closed.
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let mut r = rig();

        r.transport.connect(&format!("http://{addr}")).unwrap();
        r.pump_one().await;

        assert_eq!(r.transport.state(), ConnectionState::Failed);
        match r.events.try_recv().unwrap() {
            TransportEvent::ConnectionFailed { reason } => assert!(!reason.is_empty()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn not_ready_outside_a_runtime() {
        let (done_tx, _completions) = mpsc::unbounded_channel();
        let mut wire = HttpWire::new(TIMEOUT, done_tx).unwrap();
        assert!(!wire.is_ready());
        let outbound = Outbound {
            id: RequestId::new(),
            method: Method::Get,
            url: "http://127.0.0.1:1/health".to_owned(),
            body: None,
        };
        assert_eq!(wire.send(outbound), Err(WireError::NotReady));
    }

    #[tokio::test]
    async fn cancel_aborts_the_request_task() {
        let (done_tx, _completions) = mpsc::unbounded_channel();
        let mut wire = HttpWire::new(TIMEOUT, done_tx).unwrap();
        let id = RequestId::new();
        // The current-thread test runtime has not polled the task yet.
        wire.send(Outbound {
            id,
            method: Method::Get,
            url: "http://127.0.0.1:1/health".to_owned(),
            body: None,
        })
        .unwrap();
        assert_eq!(wire.active_requests(), 1);

        wire.cancel(id);
        assert_eq!(wire.active_requests(), 0);
    }
}
