//! # Modes Module
//!
//! The polymorphic mode contract and its registry.
//!
//! ## Components
//! - `registry`: ordered, immutable-after-load mode collection with
//!   capacity accounting and timeout-guarded processing
//! - `builtin`: the built-in mode set and its registration order
//!
//! A mode is one named cognitive state: a matcher (keywords + trigger
//! patterns in its config) plus a processing pipeline (the lifecycle hooks).
//! Dispatch is always through the [`Mode`] trait object held by the
//! registry, never through a concrete type.

pub mod builtin;
pub mod registry;

pub use builtin::{builtin_modes, builtin_registry};
pub use registry::{ModeRegistry, RegisteredMode};

use async_trait::async_trait;

use crate::error::EngineError;
use crate::models::{CanHandle, ModeConfig, ModeContext, ProcessOutcome};

/// The mode recognition falls back to when no signal matches anything.
pub const DEFAULT_MODE: &str = "thinking";

/// Lifecycle contract every mode implements.
///
/// `on_activate` and `on_deactivate` default to no-ops; most modes only
/// carry processing logic. `on_can_handle` defaults to a keyword scan of
/// the mode's own config, which is the self-scoring complement to the
/// intent analyzer.
#[async_trait]
pub trait Mode: Send + Sync + 'static {
    /// Static configuration; immutable after registry load.
    fn config(&self) -> &ModeConfig;

    /// Called when a session switches into this mode.
    async fn on_activate(&self, _ctx: &ModeContext) -> Result<(), EngineError> {
        Ok(())
    }

    /// Processes one input while this mode is active.
    async fn on_process(&self, input: &str, ctx: &ModeContext) -> Result<ProcessOutcome, EngineError>;

    /// Self-assessment of how well this mode could handle the input.
    async fn on_can_handle(&self, input: &str, _ctx: &ModeContext) -> CanHandle {
        keyword_can_handle(self.config(), input)
    }

    /// Called when a session switches away from this mode or closes.
    async fn on_deactivate(&self, _session_id: &str) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Default `on_can_handle`: substring scan of the mode's keyword list.
pub fn keyword_can_handle(config: &ModeConfig, input: &str) -> CanHandle {
    let lower = input.to_lowercase();
    let hits: Vec<&str> = config
        .keywords
        .iter()
        .map(String::as_str)
        .filter(|keyword| lower.contains(*keyword))
        .collect();

    if hits.is_empty() {
        CanHandle {
            confidence: 0.1,
            reasoning: format!("no {} keywords in input", config.id),
        }
    } else {
        let confidence = (0.4 + 0.15 * hits.len() as f32).min(1.0);
        CanHandle {
            confidence,
            reasoning: format!("matched keywords: {}", hits.join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModeCategory;

    fn config_with_keywords(keywords: &[&str]) -> ModeConfig {
        ModeConfig {
            id: "sample".to_string(),
            category: ModeCategory::Reasoning,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            triggers: vec![],
            priority: 1,
            timeout_ms: 1_000,
            min_input_len: 1,
            max_input_len: 1_000,
            required_context: vec![],
            max_concurrent_sessions: 8,
        }
    }

    #[test]
    fn test_keyword_can_handle_no_match() {
        let config = config_with_keywords(&["bug", "fix"]);
        let result = keyword_can_handle(&config, "hello world");
        assert!(result.confidence <= 0.1);
        assert!(result.reasoning.contains("no sample keywords"));
    }

    #[test]
    fn test_keyword_can_handle_scales_with_hits() {
        let config = config_with_keywords(&["bug", "fix", "crash"]);
        let one = keyword_can_handle(&config, "there is a bug");
        let two = keyword_can_handle(&config, "fix this bug");
        assert!(two.confidence > one.confidence);
        assert!(two.reasoning.contains("fix"));
        assert!(two.reasoning.contains("bug"));
    }

    #[test]
    fn test_keyword_can_handle_confidence_bounded() {
        let config = config_with_keywords(&["a", "b", "c", "d", "e", "f", "g"]);
        let result = keyword_can_handle(&config, "a b c d e f g");
        assert!(result.confidence <= 1.0);
    }
}
