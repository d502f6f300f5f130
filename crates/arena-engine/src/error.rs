//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode of startup, the run itself,
//! and recording export, so `main` can propagate with `?`.

use std::path::PathBuf;

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: arena_core::ConfigError,
    },

    /// The simulation loop failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: arena_core::RunnerError,
    },

    /// The HTTP client could not be built.
    #[error("HTTP client error: {source}")]
    HttpClient {
        /// The underlying client error.
        #[from]
        source: reqwest::Error,
    },

    /// A recording file could not be read or written.
    #[error("recording I/O error for {}: {source}", path.display())]
    RecordingIo {
        /// The recording file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A recording could not be encoded or decoded.
    #[error("recording format error: {source}")]
    RecordingFormat {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}
