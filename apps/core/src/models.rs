//! Core data model for the recognition engine.
//!
//! Everything the components exchange lives here: the static per-mode
//! configuration, the ephemeral recognition structures, and the append-only
//! history entry. Derived analytics structures live in `history::analytics`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use validator::Validate;

/// Broad grouping of modes, the only mode attribute a display collaborator
/// needs besides the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeCategory {
    Reasoning,
    Engineering,
    Creative,
    Analytical,
    Meta,
}

impl ModeCategory {
    /// Returns a human-readable label for the category
    pub fn label(&self) -> &'static str {
        match self {
            ModeCategory::Reasoning => "reasoning",
            ModeCategory::Engineering => "engineering",
            ModeCategory::Creative => "creative",
            ModeCategory::Analytical => "analytical",
            ModeCategory::Meta => "meta",
        }
    }
}

impl fmt::Display for ModeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Static configuration of a mode. Loaded into the registry at startup and
/// immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ModeConfig {
    /// Unique identifier, e.g. `"debugging"`.
    #[validate(length(min = 1))]
    pub id: String,
    /// Display grouping.
    pub category: ModeCategory,
    /// Ordered keyword list matched against the tokenized input.
    pub keywords: Vec<String>,
    /// Ordered regex trigger sources matched against the raw input.
    /// Compiled and validated once at registry load.
    pub triggers: Vec<String>,
    /// Relative importance for display purposes; ordering authority stays
    /// with the registry's registration order.
    pub priority: u8,
    /// Upper bound for a single `on_process` call, in milliseconds.
    #[validate(range(min = 1))]
    pub timeout_ms: u64,
    /// Shortest input `on_process` accepts.
    pub min_input_len: usize,
    /// Longest input `on_process` accepts.
    #[validate(range(min = 1))]
    pub max_input_len: usize,
    /// Metadata keys that must be present in the context for activation.
    pub required_context: Vec<String>,
    /// Concurrent-session ceiling enforced by the registry.
    #[validate(range(min = 1))]
    pub max_concurrent_sessions: usize,
}

/// Ephemeral per-recognition context handed to mode lifecycle hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeContext {
    pub session_id: String,
    pub user_id: String,
    /// The raw input that triggered this recognition.
    pub input: String,
    pub timestamp: DateTime<Utc>,
    /// The mode that was active before this recognition, if any.
    pub previous_mode: Option<String>,
    /// Selector confidence for the recommendation that led here.
    pub confidence: f32,
    /// Arbitrary caller-supplied metadata.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ModeContext {
    /// Builds a context for a session with no metadata attached.
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            input: input.into(),
            timestamp: Utc::now(),
            previous_mode: None,
            confidence: 0.0,
            metadata: HashMap::new(),
        }
    }
}

/// Session telemetry supplied by the caller alongside each input.
///
/// Recognition reads the clock and session state exclusively from here,
/// which keeps identical `(input, telemetry)` pairs deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTelemetry {
    pub session_id: String,
    pub user_id: String,
    /// Errors the caller observed recently (compiler, runtime, tooling).
    #[serde(default)]
    pub recent_error_count: u32,
    /// Files the user currently has open.
    #[serde(default)]
    pub active_files: Vec<String>,
    /// Local wall-clock hour, 0-23.
    pub local_hour: u32,
    /// How long this session has been running.
    #[serde(default)]
    pub session_duration_secs: u64,
    /// The mode the caller believes is active, if any.
    #[serde(default)]
    pub current_mode: Option<String>,
}

impl SessionTelemetry {
    /// Minimal telemetry for a session, defaulting every signal to quiet.
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>, local_hour: u32) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            recent_error_count: 0,
            active_files: Vec::new(),
            local_hour,
            session_duration_secs: 0,
            current_mode: None,
        }
    }
}

/// Result of a recognition call: one recommendation plus the trail that
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionResult {
    /// The winning mode id.
    pub recommended_mode: String,
    /// Overall confidence, 0.0 - 1.0.
    pub confidence: f32,
    /// Human-readable concatenation of the contributing factors.
    pub reasoning: String,
    /// Up to three runner-up modes, best first.
    pub alternative_modes: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// What a state-machine event did to the session's active mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeAction {
    Activate,
    Deactivate,
    Transition,
}

impl ModeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModeAction::Activate => "activate",
            ModeAction::Deactivate => "deactivate",
            ModeAction::Transition => "transition",
        }
    }

    /// Parses the wire form used by exports.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "activate" => Some(ModeAction::Activate),
            "deactivate" => Some(ModeAction::Deactivate),
            "transition" => Some(ModeAction::Transition),
            _ => None,
        }
    }
}

impl fmt::Display for ModeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable record in the append-only history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique entry id (UUID v4).
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub mode_id: String,
    /// The previously active mode, for `transition` entries.
    #[serde(default)]
    pub from_mode: Option<String>,
    pub action: ModeAction,
    pub timestamp: DateTime<Utc>,
    /// Time the mode was active, recorded on deactivation.
    #[serde(default)]
    pub duration_secs: Option<u64>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Result of a mode's `on_process` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub success: bool,
    pub output: String,
    /// The mode's own confidence in its output, 0.0 - 1.0.
    pub confidence: f32,
    /// A mode may nominate a follow-up mode for the next input.
    #[serde(default)]
    pub suggested_next_mode: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ProcessOutcome {
    /// A successful outcome with the given output and confidence.
    pub fn ok(output: impl Into<String>, confidence: f32) -> Self {
        Self {
            success: true,
            output: output.into(),
            confidence: confidence.clamp(0.0, 1.0),
            suggested_next_mode: None,
            metadata: HashMap::new(),
        }
    }

    /// A failed outcome. Confidence is pinned to zero.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
            confidence: 0.0,
            suggested_next_mode: None,
            metadata: HashMap::new(),
        }
    }

    /// Attaches a suggested next mode.
    pub fn suggesting(mut self, mode_id: impl Into<String>) -> Self {
        self.suggested_next_mode = Some(mode_id.into());
        self
    }
}

/// A mode's self-assessment of how well it could handle an input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanHandle {
    /// 0.0 - 1.0.
    pub confidence: f32,
    pub reasoning: String,
}
