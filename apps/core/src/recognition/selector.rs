//! Mode selection.
//!
//! Combines the intent score and the context snapshot into one
//! recommendation using a fixed weight table. The weights are a frozen
//! policy: behavioral compatibility matters more than their provenance,
//! so they are named constants and never derived.

use std::collections::HashMap;

use serde_json::json;

use super::context::{ContextSnapshot, SituationalFactor};
use super::intent::IntentScore;
use crate::models::RecognitionResult;
use crate::modes::{ModeRegistry, DEFAULT_MODE};

/// Weight of the intent confidence for the intent's own mode.
pub const INTENT_WEIGHT: f32 = 0.4;
/// Flat bonus per situational factor mapped to a mode.
pub const FACTOR_WEIGHT: f32 = 0.3;
/// Flat bonus per appearance in the user's preferred-mode list.
pub const PREFERENCE_WEIGHT: f32 = 0.2;
/// Flat bonus for staying in the previous mode.
pub const CONTINUITY_WEIGHT: f32 = 0.1;

/// Fixed factor-to-mode mapping.
fn factor_target(factor: SituationalFactor) -> &'static str {
    match factor {
        SituationalFactor::RecentErrors => "debugging",
        SituationalFactor::AfterHours => "brainstorming",
        SituationalFactor::LongSession => "focusing",
    }
}

/// Weighted mode selector.
pub struct ModeSelector;

impl Default for ModeSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeSelector {
    pub fn new() -> Self {
        Self
    }

    /// Scores every registered mode and returns the argmax with reasoning.
    ///
    /// The intent term applies only when the intent actually matched
    /// something (`raw_score > 0`); the zero-match fallback would otherwise
    /// drown out the continuity bonus. Ties keep the earlier registered
    /// mode. When every score is zero the default mode is recommended.
    pub fn select(
        &self,
        intent: &IntentScore,
        context: &ContextSnapshot,
        previous_mode: Option<&str>,
        registry: &ModeRegistry,
    ) -> RecognitionResult {
        // Registration order, so the argmax scan is deterministic.
        let mut scores: Vec<(String, f32)> = registry
            .iter()
            .map(|m| (m.config().id.clone(), 0.0f32))
            .collect();
        let mut reasons: Vec<String> = Vec::new();

        let bump = |scores: &mut Vec<(String, f32)>, id: &str, amount: f32| {
            if let Some(entry) = scores.iter_mut().find(|(mode, _)| mode == id) {
                entry.1 += amount;
            }
        };

        if intent.raw_score > 0 {
            bump(&mut scores, &intent.mode_id, intent.confidence * INTENT_WEIGHT);
            reasons.push(format!(
                "intent '{}' ({} pattern hits, {} keyword hits, confidence {:.2})",
                intent.mode_id, intent.pattern_hits, intent.keyword_hits, intent.confidence
            ));
        }

        for factor in &context.factors {
            let target = factor_target(*factor);
            if registry.contains(target) {
                bump(&mut scores, target, FACTOR_WEIGHT);
                reasons.push(format!("situational factor {} favors '{}'", factor, target));
            }
        }

        for mode in &context.preferred_modes {
            if registry.contains(mode) {
                bump(&mut scores, mode, PREFERENCE_WEIGHT);
                reasons.push(format!("user preference for '{}'", mode));
            }
        }

        if let Some(prev) = previous_mode {
            if registry.contains(prev) {
                bump(&mut scores, prev, CONTINUITY_WEIGHT);
                reasons.push(format!("continuity with previous mode '{}'", prev));
            }
        }

        let mut best_index = 0usize;
        let mut best_score = 0.0f32;
        for (i, (_, score)) in scores.iter().enumerate() {
            if *score > best_score {
                best_score = *score;
                best_index = i;
            }
        }

        let recommended_mode = if best_score > 0.0 {
            scores[best_index].0.clone()
        } else {
            reasons.push(format!("no scoring signals; defaulting to '{}'", DEFAULT_MODE));
            DEFAULT_MODE.to_string()
        };

        // Runner-ups with a non-zero score, best first, at most three.
        let mut alternatives: Vec<(String, f32)> = scores
            .iter()
            .filter(|(mode, score)| *score > 0.0 && *mode != recommended_mode)
            .cloned()
            .collect();
        alternatives.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let alternative_modes: Vec<String> =
            alternatives.into_iter().take(3).map(|(mode, _)| mode).collect();

        let factor_term = if context.factors.is_empty() { 0.1 } else { 0.3 };
        let confidence = (intent.confidence * 0.6 + factor_term + 0.1).min(1.0);

        let mut metadata = HashMap::new();
        metadata.insert(
            "scores".to_string(),
            json!(scores
                .iter()
                .filter(|(_, s)| *s > 0.0)
                .map(|(m, s)| (m.clone(), *s))
                .collect::<HashMap<String, f32>>()),
        );
        metadata.insert("intent_raw_score".to_string(), json!(intent.raw_score));

        RecognitionResult {
            recommended_mode,
            confidence,
            reasoning: reasons.join("; "),
            alternative_modes,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::builtin_registry;

    fn intent_for(mode: &str, raw_score: u32, confidence: f32) -> IntentScore {
        IntentScore {
            mode_id: mode.to_string(),
            raw_score,
            pattern_hits: 0,
            keyword_hits: raw_score,
            matched_terms: vec![],
            token_count: 4,
            confidence,
        }
    }

    fn snapshot(factors: Vec<SituationalFactor>, preferred: Vec<&str>) -> ContextSnapshot {
        ContextSnapshot {
            current_mode: None,
            factors,
            preferred_modes: preferred.into_iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_intent_alone_wins() {
        let registry = builtin_registry().unwrap();
        let selector = ModeSelector::new();

        let result = selector.select(
            &intent_for("debugging", 6, 0.94),
            &snapshot(vec![], vec![]),
            None,
            &registry,
        );
        assert_eq!(result.recommended_mode, "debugging");
        // 0.94*0.6 + 0.1 + 0.1
        assert!((result.confidence - 0.764).abs() < 1e-6);
        assert!(result.reasoning.contains("intent 'debugging'"));
    }

    #[test]
    fn test_continuity_holds_without_intent() {
        // Scenario: "ok thanks" after debugging. The fallback intent carries
        // no weight, so the 0.1 continuity bonus decides.
        let registry = builtin_registry().unwrap();
        let selector = ModeSelector::new();

        let result = selector.select(
            &intent_for(DEFAULT_MODE, 0, 0.5),
            &snapshot(vec![], vec![]),
            Some("debugging"),
            &registry,
        );
        assert_eq!(result.recommended_mode, "debugging");
        assert!(result.reasoning.contains("continuity"));
        // 0.5*0.6 + 0.1 + 0.1
        assert!((result.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_strong_intent_beats_situational_factor() {
        // "optimize this loop" with recent errors: 0.4 x 1.0 for optimizing
        // against the flat 0.3 for debugging.
        let registry = builtin_registry().unwrap();
        let selector = ModeSelector::new();

        let result = selector.select(
            &intent_for("optimizing", 4, 1.0),
            &snapshot(vec![SituationalFactor::RecentErrors], vec![]),
            None,
            &registry,
        );
        assert_eq!(result.recommended_mode, "optimizing");
        let scores = &result.metadata["scores"];
        assert!((scores["optimizing"].as_f64().unwrap() - 0.4).abs() < 1e-6);
        assert!((scores["debugging"].as_f64().unwrap() - 0.3).abs() < 1e-6);
        // 1.0*0.6 + 0.3 + 0.1
        assert!((result.confidence - 1.0).abs() < 1e-6);
        assert_eq!(result.alternative_modes, vec!["debugging".to_string()]);
    }

    #[test]
    fn test_weak_intent_loses_to_situational_factor() {
        // 0.4 x 0.7 = 0.28 < 0.3: the factor flips the outcome.
        let registry = builtin_registry().unwrap();
        let selector = ModeSelector::new();

        let result = selector.select(
            &intent_for("optimizing", 1, 0.7),
            &snapshot(vec![SituationalFactor::RecentErrors], vec![]),
            None,
            &registry,
        );
        assert_eq!(result.recommended_mode, "debugging");
    }

    #[test]
    fn test_preferences_accumulate() {
        let registry = builtin_registry().unwrap();
        let selector = ModeSelector::new();

        let result = selector.select(
            &intent_for(DEFAULT_MODE, 0, 0.5),
            &snapshot(vec![], vec!["planning"]),
            None,
            &registry,
        );
        assert_eq!(result.recommended_mode, "planning");
        assert!(result.reasoning.contains("user preference for 'planning'"));
    }

    #[test]
    fn test_zero_scores_default_to_thinking() {
        let registry = builtin_registry().unwrap();
        let selector = ModeSelector::new();

        let result = selector.select(
            &intent_for(DEFAULT_MODE, 0, 0.5),
            &snapshot(vec![], vec![]),
            None,
            &registry,
        );
        assert_eq!(result.recommended_mode, DEFAULT_MODE);
        assert!(result.reasoning.contains("no scoring signals"));
    }

    #[test]
    fn test_confidence_bounded() {
        let registry = builtin_registry().unwrap();
        let selector = ModeSelector::new();

        let result = selector.select(
            &intent_for("debugging", 10, 1.0),
            &snapshot(
                vec![SituationalFactor::RecentErrors, SituationalFactor::AfterHours],
                vec!["debugging", "debugging"],
            ),
            Some("debugging"),
            &registry,
        );
        assert!(result.confidence <= 1.0);
        assert_eq!(result.recommended_mode, "debugging");
    }

    #[test]
    fn test_unknown_previous_mode_is_ignored() {
        let registry = builtin_registry().unwrap();
        let selector = ModeSelector::new();

        let result = selector.select(
            &intent_for(DEFAULT_MODE, 0, 0.5),
            &snapshot(vec![], vec![]),
            Some("meditating"),
            &registry,
        );
        assert_eq!(result.recommended_mode, DEFAULT_MODE);
        assert!(!result.reasoning.contains("meditating"));
    }
}
