use std::io;
use thiserror::Error;

/// Engine-wide error type, consolidating all possible errors into a single enum.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A mode lookup by an id the registry does not know. Never silently defaulted.
    #[error("unknown mode: {0}")]
    InvalidModeReference(String),

    /// An activation would exceed the mode's configured concurrent-session limit.
    #[error("mode '{mode_id}' is at capacity ({limit} concurrent sessions)")]
    CapacityExceeded { mode_id: String, limit: usize },

    /// A mode's `on_process` did not complete within its configured timeout.
    #[error("processing in mode '{mode_id}' timed out after {timeout_ms}ms")]
    ProcessingTimeout { mode_id: String, timeout_ms: u64 },

    /// A mode-internal failure during processing; the message is surfaced.
    #[error("processing in mode '{mode_id}' failed: {message}")]
    ProcessingFailure { mode_id: String, message: String },

    /// An operation referenced a session the manager does not track.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Configuration-related errors, including registry load validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// Standard input/output errors (persistence sink).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or import parsing errors.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<chrono::ParseError> for EngineError {
    fn from(err: chrono::ParseError) -> Self {
        EngineError::Serialization(format!("date parse error: {}", err))
    }
}

impl From<regex::Error> for EngineError {
    fn from(err: regex::Error) -> Self {
        EngineError::Config(format!("invalid trigger pattern: {}", err))
    }
}

impl From<validator::ValidationErrors> for EngineError {
    fn from(err: validator::ValidationErrors) -> Self {
        EngineError::Config(format!("validation errors: {}", err))
    }
}
