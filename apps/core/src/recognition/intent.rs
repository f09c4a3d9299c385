//! Intent analysis using keyword and regex pattern matching.
//!
//! Fast rule-based scoring of raw input against every registered mode.
//! No ML model involved - pure tokenization plus regex matching, so the
//! same input always produces the same score.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::modes::{ModeRegistry, DEFAULT_MODE};

/// Stopwords stripped before keyword matching.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "if", "then", "else", "when", "at", "by", "for",
    "with", "about", "into", "through", "during", "before", "after", "to", "from", "in", "on",
    "off", "over", "under", "again", "further", "once", "here", "there", "all", "any", "both",
    "each", "few", "more", "most", "other", "some", "such", "no", "nor", "not", "only", "own",
    "same", "so", "than", "too", "very", "can", "will", "just", "should", "now", "i", "me",
    "my", "we", "our", "you", "your", "he", "him", "his", "she", "her", "it", "its", "they",
    "them", "their", "what", "which", "who", "whom", "this", "that", "these", "those", "am",
    "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "having", "do",
    "does", "did", "doing", "please",
];

static STOPWORD_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOPWORDS.iter().copied().collect());

/// Raw intent of a single input, before context weighting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentScore {
    /// The winning mode id (the default mode when nothing matched).
    pub mode_id: String,
    /// `2 x pattern hits + 1 x keyword hits`. Zero means the fallback won.
    pub raw_score: u32,
    pub pattern_hits: u32,
    pub keyword_hits: u32,
    /// The pattern fragments and keywords that matched, for reasoning output.
    pub matched_terms: Vec<String>,
    /// Tokens surviving stopword filtering.
    pub token_count: usize,
    /// 0.0 - 1.0.
    pub confidence: f32,
}

/// Tokenizes input for keyword matching: lowercase, split on
/// non-alphanumeric (keeping `_`/`-` interior), drop stopwords, short
/// tokens, and pure numbers.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
        .filter(|word| {
            let w = word.trim();
            w.len() >= 2
                && !STOPWORD_SET.contains(w)
                && !w.chars().all(|c| c.is_numeric())
        })
        .map(|s| s.to_string())
        .collect()
}

/// Rule-based intent analyzer.
///
/// Stateless; all matching data lives in the registry's mode configs, so
/// the registry's registration order doubles as the deterministic tie-break
/// order.
pub struct IntentAnalyzer;

impl Default for IntentAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Scores the input against every registered mode and returns the best.
    ///
    /// Per mode: `raw = 2 x (trigger patterns matching the raw text) +
    /// 1 x (keywords present in the token list)`. Ties keep the earlier
    /// registered mode. When every mode scores zero the default mode wins
    /// with `raw_score = 0`.
    pub fn analyze(&self, input: &str, registry: &ModeRegistry) -> IntentScore {
        let tokens = tokenize(input);
        let token_set: HashSet<&str> = tokens.iter().map(String::as_str).collect();

        let mut best: Option<IntentScore> = None;

        for registered in registry.iter() {
            let config = registered.config();

            let mut matched_terms = Vec::new();
            let mut pattern_hits = 0u32;
            for pattern in registered.triggers() {
                if let Some(found) = pattern.find(input) {
                    pattern_hits += 1;
                    matched_terms.push(found.as_str().to_string());
                }
            }

            let mut keyword_hits = 0u32;
            for keyword in &config.keywords {
                if token_set.contains(keyword.as_str()) {
                    keyword_hits += 1;
                    matched_terms.push(keyword.clone());
                }
            }

            let raw_score = 2 * pattern_hits + keyword_hits;
            let is_better = match &best {
                Some(current) => raw_score > current.raw_score,
                None => raw_score > 0,
            };
            if is_better {
                best = Some(IntentScore {
                    mode_id: config.id.clone(),
                    raw_score,
                    pattern_hits,
                    keyword_hits,
                    matched_terms,
                    token_count: tokens.len(),
                    confidence: 0.0,
                });
            }
        }

        let mut score = best.unwrap_or_else(|| IntentScore {
            mode_id: DEFAULT_MODE.to_string(),
            raw_score: 0,
            pattern_hits: 0,
            keyword_hits: 0,
            matched_terms: vec![],
            token_count: tokens.len(),
            confidence: 0.0,
        });

        score.confidence = confidence(score.pattern_hits, score.keyword_hits, score.token_count);
        score
    }
}

/// `0.5 base + 0.2 x pattern hits + 0.3 x keyword-hit ratio`, capped at 1.0.
fn confidence(pattern_hits: u32, keyword_hits: u32, token_count: usize) -> f32 {
    let keyword_ratio = keyword_hits as f32 / token_count.max(1) as f32;
    (0.5 + 0.2 * pattern_hits as f32 + 0.3 * keyword_ratio).min(1.0)
}
