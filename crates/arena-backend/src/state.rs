//! Shared application state for the decision backend.
//!
//! [`AppState`] holds the decision policy, the tool table, and request
//! counters. Handlers only read the policy and tools, and counters are
//! atomics, so no request ever waits on a lock.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::policy::DecisionPolicy;
use crate::tools::ToolDispatcher;

/// Running request counters.
#[derive(Debug, Default)]
pub struct Metrics {
    total_ticks: AtomicU64,
    total_observations: AtomicU64,
    tool_calls: AtomicU64,
}

/// Point-in-time copy of [`Metrics`], as served by `GET /metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Tick requests handled.
    pub total_ticks: u64,
    /// Observations decided on, across all tick requests.
    pub total_observations: u64,
    /// Tool calls handled.
    pub tool_calls: u64,
}

impl Metrics {
    /// Count one tick request carrying `observations` observations.
    pub fn record_tick(&self, observations: usize) {
        self.total_ticks.fetch_add(1, Ordering::Relaxed);
        self.total_observations.fetch_add(
            u64::try_from(observations).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    /// Count one tool call.
    pub fn record_tool_call(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_ticks: self.total_ticks.load(Ordering::Relaxed),
            total_observations: self.total_observations.load(Ordering::Relaxed),
            tool_calls: self.tool_calls.load(Ordering::Relaxed),
        }
    }
}

/// Shared state for all request handlers.
pub struct AppState {
    /// Decides what each observed agent does.
    pub policy: Box<dyn DecisionPolicy>,
    /// Tool handlers.
    pub tools: ToolDispatcher,
    /// Request counters.
    pub metrics: Metrics,
}

impl AppState {
    /// Create state around `policy` with the default tools.
    pub fn new(policy: impl DecisionPolicy + 'static) -> Self {
        Self {
            policy: Box::new(policy),
            tools: ToolDispatcher::with_defaults(),
            metrics: Metrics::default(),
        }
    }
}
