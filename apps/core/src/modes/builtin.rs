//! Built-in modes.
//!
//! A representative subset of the full mode catalog, each an independent
//! variant of the [`Mode`] trait. Registration order is fixed and part of
//! the engine's behavior: the default mode is registered first so that it
//! wins every tie.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::registry::ModeRegistry;
use super::Mode;
use crate::error::EngineError;
use crate::models::{ModeCategory, ModeConfig, ModeContext, ProcessOutcome};
use crate::recognition::intent::tokenize;

/// Lines matched against input when hunting for failure symptoms.
const FAILURE_MARKERS: &[&str] = &[
    "error",
    "panic",
    "exception",
    "stack trace",
    "segfault",
    "assertion",
    "failed",
    "crash",
];

/// Hints that an input is talking about a performance hotspot.
const HOTSPOT_MARKERS: &[&str] = &[
    "loop", "alloc", "clone", "nested", "query", "io", "lock", "cache",
];

/// Code-shaped fragments a review pass should look at first.
const REVIEW_MARKERS: &[&str] = &["fn ", "struct ", "class ", "unwrap", "todo", "panic"];

/// Reframing angles used to seed a brainstorming pass.
const BRAINSTORM_ANGLES: &[&str] = &[
    "invert it: what would guarantee the opposite outcome?",
    "constrain it: how would this look with a tenth of the budget?",
    "combine it: which two existing pieces already cover part of this?",
    "simplify it: what is the smallest version worth shipping?",
    "borrow it: which other domain has already solved this shape?",
];

fn base_config(
    id: &str,
    category: ModeCategory,
    priority: u8,
    keywords: &[&str],
    triggers: &[&str],
) -> ModeConfig {
    ModeConfig {
        id: id.to_string(),
        category,
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
        triggers: triggers.iter().map(|s| s.to_string()).collect(),
        priority,
        timeout_ms: 5_000,
        min_input_len: 1,
        max_input_len: 20_000,
        required_context: vec![],
        max_concurrent_sessions: 32,
    }
}

/// Splits input into trimmed, non-empty sentences.
fn sentences(input: &str) -> Vec<&str> {
    input
        .split(|c| matches!(c, '.' | '!' | '?' | '\n'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn count_markers(input: &str, markers: &[&str]) -> Vec<String> {
    let lower = input.to_lowercase();
    markers
        .iter()
        .filter(|m| lower.contains(**m))
        .map(|m| m.trim().to_string())
        .collect()
}

// --- thinking ---

/// The default mode: general structured reasoning about whatever came in.
pub struct ThinkingMode {
    config: ModeConfig,
}

impl ThinkingMode {
    pub fn new() -> Self {
        Self {
            config: base_config(
                "thinking",
                ModeCategory::Reasoning,
                1,
                &[
                    "think", "reason", "consider", "ponder", "wonder", "understand", "why",
                    "assumption",
                ],
                &[
                    r"(?i)\bthink (this|it) through\b",
                    r"(?i)\breason about\b",
                    r"(?i)\bwhat do you think\b",
                ],
            ),
        }
    }
}

impl Default for ThinkingMode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mode for ThinkingMode {
    fn config(&self) -> &ModeConfig {
        &self.config
    }

    async fn on_process(
        &self,
        input: &str,
        _ctx: &ModeContext,
    ) -> Result<ProcessOutcome, EngineError> {
        let parts = sentences(input);
        let questions = input.matches('?').count().min(parts.len());

        let mut output = String::from("Framing:\n");
        for (i, part) in parts.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, part));
        }
        if parts.is_empty() {
            output.push_str("  (nothing concrete to frame yet)\n");
        }
        output.push_str(&format!(
            "Open questions: {}; statements to verify: {}",
            questions,
            parts.len().saturating_sub(questions)
        ));

        Ok(ProcessOutcome::ok(output, 0.6))
    }
}

// --- debugging ---

/// Failure triage: pull out the symptoms, then walk a fixed checklist.
pub struct DebuggingMode {
    config: ModeConfig,
}

impl DebuggingMode {
    pub fn new() -> Self {
        let mut config = base_config(
            "debugging",
            ModeCategory::Engineering,
            8,
            &[
                "bug", "fix", "error", "crash", "broken", "debug", "stack", "trace",
                "exception", "panic", "failing", "failure",
            ],
            &[
                r"(?i)\bstack\s?trace\b",
                r"(?i)\b(segfault|core dump|null pointer)\b",
                r"(?i)\bwon'?t (compile|start|run)\b",
                r"(?i)\b(error|exception):",
            ],
        );
        // Triage regularly chews through pasted logs.
        config.timeout_ms = 8_000;
        Self { config }
    }
}

impl Default for DebuggingMode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mode for DebuggingMode {
    fn config(&self) -> &ModeConfig {
        &self.config
    }

    async fn on_process(
        &self,
        input: &str,
        _ctx: &ModeContext,
    ) -> Result<ProcessOutcome, EngineError> {
        let symptoms = count_markers(input, FAILURE_MARKERS);

        let mut output = String::new();
        if symptoms.is_empty() {
            output.push_str("No explicit failure symptoms in the report.\n");
        } else {
            output.push_str("Symptoms detected:\n");
            for symptom in &symptoms {
                output.push_str(&format!("  - {}\n", symptom));
            }
        }
        output.push_str("Triage order:\n");
        output.push_str("  1. Reproduce with the smallest input that still fails\n");
        output.push_str("  2. Read the first failure, not the last; later ones usually cascade\n");
        output.push_str("  3. Bisect the change history if the failure is new\n");
        output.push_str("  4. Confirm the fix also removes the symptom, not just the message");

        let confidence = (0.5 + 0.1 * symptoms.len() as f32).min(0.9);
        let mut outcome = ProcessOutcome::ok(output, confidence);
        outcome
            .metadata
            .insert("symptom_count".to_string(), json!(symptoms.len()));
        if !symptoms.is_empty() {
            outcome = outcome.suggesting("reviewing");
        }
        Ok(outcome)
    }
}

// --- optimizing ---

/// Performance work: measurement first, then the usual suspects.
pub struct OptimizingMode {
    config: ModeConfig,
}

impl OptimizingMode {
    pub fn new() -> Self {
        Self {
            config: base_config(
                "optimizing",
                ModeCategory::Engineering,
                7,
                &[
                    "optimize", "optimization", "performance", "slow", "faster", "speed",
                    "memory", "cache", "efficient", "latency", "loop", "profile", "benchmark",
                ],
                &[
                    r"(?i)\boptimi[sz]e\b",
                    r"(?i)\b(too slow|speed up|bottleneck)\b",
                    r"(?i)\breduce (memory|alloc\w*)\b",
                ],
            ),
        }
    }
}

impl Default for OptimizingMode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mode for OptimizingMode {
    fn config(&self) -> &ModeConfig {
        &self.config
    }

    async fn on_process(
        &self,
        input: &str,
        _ctx: &ModeContext,
    ) -> Result<ProcessOutcome, EngineError> {
        let hotspots = count_markers(input, HOTSPOT_MARKERS);

        let mut output = String::from("Measure before changing anything:\n");
        output.push_str("  1. Capture a baseline (wall clock and allocations)\n");
        output.push_str("  2. Profile to find where the time actually goes\n");
        if hotspots.is_empty() {
            output.push_str("  3. No obvious hotspot named; profile output decides\n");
        } else {
            output.push_str(&format!(
                "  3. Named suspects to check first: {}\n",
                hotspots.join(", ")
            ));
        }
        output.push_str("  4. Re-run the baseline after each change; keep only wins");

        let confidence = (0.55 + 0.05 * hotspots.len() as f32).min(0.85);
        let mut outcome = ProcessOutcome::ok(output, confidence).suggesting("reviewing");
        outcome
            .metadata
            .insert("hotspots".to_string(), json!(hotspots));
        Ok(outcome)
    }
}

// --- creating ---

/// Building something new from a description.
pub struct CreatingMode {
    config: ModeConfig,
}

impl CreatingMode {
    pub fn new() -> Self {
        Self {
            config: base_config(
                "creating",
                ModeCategory::Creative,
                6,
                &[
                    "create", "build", "generate", "implement", "scaffold", "prototype",
                    "draft", "add",
                ],
                &[
                    r"(?i)^(create|build|make|write|generate|implement)\b",
                    r"(?i)\bfrom scratch\b",
                ],
            ),
        }
    }
}

impl Default for CreatingMode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mode for CreatingMode {
    fn config(&self) -> &ModeConfig {
        &self.config
    }

    async fn on_process(
        &self,
        input: &str,
        _ctx: &ModeContext,
    ) -> Result<ProcessOutcome, EngineError> {
        let requirements = sentences(input);

        let mut output = String::from("Requirements captured:\n");
        for requirement in &requirements {
            output.push_str(&format!("  - {}\n", requirement));
        }
        output.push_str(
            "Build order: skeleton first, one requirement at a time, \
             demo after each increment",
        );

        let mut outcome = ProcessOutcome::ok(output, 0.6);
        outcome
            .metadata
            .insert("requirement_count".to_string(), json!(requirements.len()));
        Ok(outcome)
    }
}

// --- analyzing ---

/// Quantitative look at the input itself: lexical shape and dominant terms.
pub struct AnalyzingMode {
    config: ModeConfig,
}

impl AnalyzingMode {
    pub fn new() -> Self {
        Self {
            config: base_config(
                "analyzing",
                ModeCategory::Analytical,
                6,
                &[
                    "analyze", "analysis", "compare", "comparison", "evaluate", "examine",
                    "measure", "metrics", "data",
                ],
                &[
                    r"(?i)\banaly[sz]e\b",
                    r"(?i)\bcompare\b",
                    r"(?i)\b(pros and cons|trade-?offs?)\b",
                ],
            ),
        }
    }
}

impl Default for AnalyzingMode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mode for AnalyzingMode {
    fn config(&self) -> &ModeConfig {
        &self.config
    }

    async fn on_process(
        &self,
        input: &str,
        _ctx: &ModeContext,
    ) -> Result<ProcessOutcome, EngineError> {
        let words = input.split_whitespace().count();
        let tokens = tokenize(input);
        let mut frequencies: HashMap<&str, usize> = HashMap::new();
        for token in &tokens {
            *frequencies.entry(token.as_str()).or_insert(0) += 1;
        }
        let unique = frequencies.len();
        let diversity = if tokens.is_empty() {
            0.0
        } else {
            unique as f32 / tokens.len() as f32
        };

        let mut dominant: Vec<(&str, usize)> = frequencies.into_iter().collect();
        dominant.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        let dominant: Vec<&str> = dominant.into_iter().take(3).map(|(t, _)| t).collect();

        let output = format!(
            "{} words, {} significant tokens ({} unique, diversity {:.2}), {} sentences; dominant terms: {}",
            words,
            tokens.len(),
            unique,
            diversity,
            sentences(input).len(),
            if dominant.is_empty() {
                "none".to_string()
            } else {
                dominant.join(", ")
            }
        );

        let mut outcome = ProcessOutcome::ok(output, 0.75);
        outcome.metadata.insert("word_count".to_string(), json!(words));
        outcome.metadata.insert("unique_tokens".to_string(), json!(unique));
        outcome
            .metadata
            .insert("lexical_diversity".to_string(), json!(diversity));
        Ok(outcome)
    }
}

// --- planning ---

/// Turns a request into an ordered, checkable plan.
pub struct PlanningMode {
    config: ModeConfig,
}

impl PlanningMode {
    pub fn new() -> Self {
        Self {
            config: base_config(
                "planning",
                ModeCategory::Reasoning,
                5,
                &[
                    "plan", "roadmap", "steps", "schedule", "milestone", "milestones",
                    "organize", "prioritize", "strategy",
                ],
                &[
                    r"(?i)\bplan\b",
                    r"(?i)\bstep[- ]by[- ]step\b",
                    r"(?i)\broad-?map\b",
                ],
            ),
        }
    }
}

impl Default for PlanningMode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mode for PlanningMode {
    fn config(&self) -> &ModeConfig {
        &self.config
    }

    async fn on_process(
        &self,
        input: &str,
        _ctx: &ModeContext,
    ) -> Result<ProcessOutcome, EngineError> {
        let parts = sentences(input);

        let mut output = String::from("Plan:\n");
        let mut step = 1;
        for part in &parts {
            output.push_str(&format!("  {}. {}\n", step, part));
            step += 1;
        }
        output.push_str(&format!("  {}. Verify the result against the original ask", step));

        Ok(ProcessOutcome::ok(output, 0.65).suggesting("focusing"))
    }
}

// --- learning ---

/// Studying something unfamiliar; pulls out the terms worth looking up.
pub struct LearningMode {
    config: ModeConfig,
}

impl LearningMode {
    pub fn new() -> Self {
        Self {
            config: base_config(
                "learning",
                ModeCategory::Reasoning,
                4,
                &[
                    "learn", "explain", "teach", "tutorial", "example", "documentation",
                    "docs", "concept", "basics",
                ],
                &[
                    r"(?i)\b(explain|teach me)\b",
                    r"(?i)\bwhat is\b",
                    r"(?i)\bhow (does|do|to)\b",
                    r"(?i)\bnew to\b",
                ],
            ),
        }
    }
}

impl Default for LearningMode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mode for LearningMode {
    fn config(&self) -> &ModeConfig {
        &self.config
    }

    async fn on_process(
        &self,
        input: &str,
        _ctx: &ModeContext,
    ) -> Result<ProcessOutcome, EngineError> {
        let mut study_terms: Vec<String> = Vec::new();
        for token in tokenize(input) {
            if token.len() >= 6 && !study_terms.contains(&token) {
                study_terms.push(token);
            }
            if study_terms.len() == 5 {
                break;
            }
        }

        let output = if study_terms.is_empty() {
            "Nothing term-shaped to study here; ask for a concrete topic.".to_string()
        } else {
            format!(
                "Study list: {}\nFor each: definition, one worked example, one thing it is often confused with.",
                study_terms.join(", ")
            )
        };

        Ok(ProcessOutcome::ok(output, 0.55))
    }
}

// --- reviewing ---

/// Quality pass over something that already exists.
pub struct ReviewingMode {
    config: ModeConfig,
}

impl ReviewingMode {
    pub fn new() -> Self {
        Self {
            config: base_config(
                "reviewing",
                ModeCategory::Analytical,
                5,
                &[
                    "review", "check", "verify", "audit", "inspect", "lint", "quality",
                    "correctness", "readability",
                ],
                &[
                    r"(?i)\breview\b",
                    r"(?i)\b(code review|pull request)\b",
                    r"(?i)\bdouble-?check\b",
                ],
            ),
        }
    }
}

impl Default for ReviewingMode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mode for ReviewingMode {
    fn config(&self) -> &ModeConfig {
        &self.config
    }

    async fn on_process(
        &self,
        input: &str,
        _ctx: &ModeContext,
    ) -> Result<ProcessOutcome, EngineError> {
        let markers = count_markers(input, REVIEW_MARKERS);

        let mut output = String::from("Review pass:\n");
        output.push_str("  - Does it do what the surrounding code expects?\n");
        output.push_str("  - Are the failure paths handled, not swallowed?\n");
        output.push_str("  - Would a new reader follow the names without a tour?\n");
        if !markers.is_empty() {
            output.push_str(&format!("  - Flagged fragments: {}", markers.join(", ")));
        }

        let confidence = (0.6 + 0.05 * markers.len() as f32).min(0.8);
        Ok(ProcessOutcome::ok(output, confidence))
    }
}

// --- brainstorming ---

/// Idea generation through fixed reframing angles.
pub struct BrainstormingMode {
    config: ModeConfig,
}

impl BrainstormingMode {
    pub fn new() -> Self {
        Self {
            config: base_config(
                "brainstorming",
                ModeCategory::Creative,
                3,
                &[
                    "brainstorm", "idea", "ideas", "alternatives", "options",
                    "possibilities", "imagine", "explore",
                ],
                &[
                    r"(?i)\bbrainstorm\b",
                    r"(?i)\bwhat if\b",
                    r"(?i)\b(any ideas|come up with)\b",
                ],
            ),
        }
    }
}

impl Default for BrainstormingMode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mode for BrainstormingMode {
    fn config(&self) -> &ModeConfig {
        &self.config
    }

    async fn on_process(
        &self,
        input: &str,
        _ctx: &ModeContext,
    ) -> Result<ProcessOutcome, EngineError> {
        let topic = sentences(input).first().copied().unwrap_or("the problem").to_string();

        let mut output = format!("Angles on \"{}\":\n", topic);
        for angle in BRAINSTORM_ANGLES {
            output.push_str(&format!("  - {}\n", angle));
        }
        output.push_str("Collect everything first; filter nothing until the list runs dry.");

        Ok(ProcessOutcome::ok(output, 0.5))
    }
}

// --- focusing ---

/// Cuts the input down to the single most substantial point.
pub struct FocusingMode {
    config: ModeConfig,
}

impl FocusingMode {
    pub fn new() -> Self {
        Self {
            config: base_config(
                "focusing",
                ModeCategory::Meta,
                2,
                &[
                    "focus", "concentrate", "distraction", "deadline", "urgent",
                    "priority", "important",
                ],
                &[
                    r"(?i)\bfocus\b",
                    r"(?i)\bdeep work\b",
                    r"(?i)\bone thing\b",
                ],
            ),
        }
    }
}

impl Default for FocusingMode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mode for FocusingMode {
    fn config(&self) -> &ModeConfig {
        &self.config
    }

    async fn on_process(
        &self,
        input: &str,
        _ctx: &ModeContext,
    ) -> Result<ProcessOutcome, EngineError> {
        let parts = sentences(input);
        let focus = parts
            .iter()
            .max_by_key(|s| tokenize(s).len())
            .copied()
            .unwrap_or("");

        let output = if focus.is_empty() {
            "Nothing to focus on yet.".to_string()
        } else {
            format!(
                "The one thing: {}\nDeferred: {} other point(s) until this is done.",
                focus,
                parts.len().saturating_sub(1)
            )
        };

        Ok(ProcessOutcome::ok(output, 0.6))
    }
}

/// The built-in modes in their fixed registration order.
///
/// `thinking` is first on purpose: registration order is the tie-break
/// order everywhere, and the default mode must win ties.
pub fn builtin_modes() -> Vec<Arc<dyn Mode>> {
    vec![
        Arc::new(ThinkingMode::new()),
        Arc::new(DebuggingMode::new()),
        Arc::new(OptimizingMode::new()),
        Arc::new(CreatingMode::new()),
        Arc::new(AnalyzingMode::new()),
        Arc::new(PlanningMode::new()),
        Arc::new(LearningMode::new()),
        Arc::new(ReviewingMode::new()),
        Arc::new(BrainstormingMode::new()),
        Arc::new(FocusingMode::new()),
    ]
}

/// Loads a registry with the built-in set.
pub fn builtin_registry() -> Result<ModeRegistry, EngineError> {
    ModeRegistry::load(builtin_modes())
}
