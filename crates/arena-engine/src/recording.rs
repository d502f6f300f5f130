//! Recording export, import, and replay.
//!
//! A recording is the event log's [`export`](arena_events::EventLog::export)
//! written as a pretty-printed JSON array. [`replay_file`] loads one back
//! into a fresh log and walks it tick by tick.

use std::path::Path;

use arena_events::EventLog;
use arena_types::{Event, Tick};
use tracing::info;

use crate::error::EngineError;

/// What a replay walked through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Distinct ticks with at least one event.
    pub ticks: usize,
    /// Total events.
    pub events: usize,
    /// Highest tick seen.
    pub last_tick: Tick,
}

/// Write `events` to `path`, replacing any existing file.
pub fn save_to_file(path: &Path, events: &[Event]) -> Result<(), EngineError> {
    let json = serde_json::to_string_pretty(events)?;
    std::fs::write(path, json).map_err(|source| EngineError::RecordingIo {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), events = events.len(), "Recording saved");
    Ok(())
}

/// Read a recording written by [`save_to_file`].
pub fn load_from_file(path: &Path) -> Result<Vec<Event>, EngineError> {
    let contents = std::fs::read_to_string(path).map_err(|source| EngineError::RecordingIo {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&contents)?)
}

/// Load a recording and log it one tick at a time.
pub fn replay_file(path: &Path) -> Result<ReplaySummary, EngineError> {
    let mut log = EventLog::new();
    log.load(load_from_file(path)?);

    let mut summary = ReplaySummary::default();
    for (tick, group) in log.replay() {
        let kinds: Vec<&str> = group.iter().map(|e| e.event_type.as_str()).collect();
        info!(tick, events = group.len(), ?kinds, "Replay tick");
        summary.ticks = summary.ticks.saturating_add(1);
        summary.events = summary.events.saturating_add(group.len());
        summary.last_tick = tick;
    }
    info!(
        path = %path.display(),
        ticks = summary.ticks,
        events = summary.events,
        "Replay complete"
    );
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use arena_types::{RequestId, kinds};
    use serde_json::json;

    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("arena-recording-{}.json", RequestId::new()))
    }

    #[test]
    fn saved_recording_replays_by_tick() {
        let events = vec![
            Event::new(kinds::SIMULATION_STARTED, 0, json!({"seed": 42})),
            Event::new(kinds::OBSERVATION_DISPATCHED, 1, json!({"agent_id": "a"})),
            Event::new(kinds::DECISION_APPLIED, 1, json!({"agent_id": "a"})),
            Event::new(kinds::TOOL_COMPLETED, 3, json!({"agent_id": "a"})),
        ];
        let path = temp_path();
        save_to_file(&path, &events).unwrap();

        let loaded = load_from_file(&path).unwrap();
        assert!(
            loaded
                .iter()
                .zip(&events)
                .all(|(a, b)| a.same_replay_identity(b))
        );

        let summary = replay_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(
            summary,
            ReplaySummary {
                ticks: 3,
                events: 4,
                last_tick: 3,
            }
        );
    }

    #[test]
    fn missing_file_reports_its_path() {
        let path = temp_path();
        let err = load_from_file(&path).unwrap_err();
        assert!(matches!(err, EngineError::RecordingIo { path: p, .. } if p == path));
    }

    #[test]
    fn garbage_is_a_format_error() {
        let path = temp_path();
        std::fs::write(&path, "not json").unwrap();
        let err = load_from_file(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, EngineError::RecordingFormat { .. }));
    }
}
