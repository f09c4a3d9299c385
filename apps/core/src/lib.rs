//! # Cognimode Core
//!
//! The recognition-and-transition engine behind Cognimode: classifies free
//! text into named cognitive modes, tracks the single active mode per
//! session, and records every transition for analytics and
//! personalization.
//!
//! ## Components
//! - `recognition`: intent scoring, context factors, weighted selection
//! - `modes`: the mode contract, registry, and built-in set
//! - `session`: the per-session state machine
//! - `history`: append-only transition log, export/import, analytics
//! - `engine`: the dependency-injected service tying it all together

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod history;
pub mod models;
pub mod modes;
pub mod recognition;
pub mod session;
pub mod telemetry;

pub use config::EngineConfig;
pub use engine::{Engine, EngineResponse, EngineStatus};
pub use error::EngineError;
pub use events::{TransitionBus, TransitionEvent};
pub use history::{
    AnalyticsAggregator, ExportFormat, HistoryQuery, HistoryRecorder, HistorySink, JsonFileSink,
    ModePreference, SessionSummary, UserAnalytics,
};
pub use models::{
    CanHandle, HistoryEntry, ModeAction, ModeCategory, ModeConfig, ModeContext, ProcessOutcome,
    RecognitionResult, SessionTelemetry,
};
pub use modes::{builtin_modes, builtin_registry, Mode, ModeRegistry, DEFAULT_MODE};
pub use recognition::{
    ContextAnalyzer, ContextSnapshot, IntentAnalyzer, IntentScore, ModeSelector,
    SituationalFactor,
};
pub use session::{ModeSession, SessionManager, SessionState};

#[cfg(test)]
mod tests;
