//! # Recognition Module
//!
//! Fast rule-based analysis of user input, run BEFORE any mode processing
//! to decide which mode should handle it.
//!
//! ## Components
//! - `intent`: keyword/pattern scoring of the raw input (fast path)
//! - `context`: situational factors and preferences from session telemetry
//! - `selector`: fixed-weight combination into one recommendation

pub mod context;
pub mod intent;
pub mod selector;

pub use context::{ContextAnalyzer, ContextSnapshot, SituationalFactor};
pub use intent::{tokenize, IntentAnalyzer, IntentScore};
pub use selector::ModeSelector;
