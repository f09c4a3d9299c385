//! Mode registry.
//!
//! Ordered, immutable-after-load collection of modes. Load is the single
//! fail-fast point of the engine: duplicate ids and malformed trigger
//! patterns are rejected before any session starts. At runtime the registry
//! enforces per-mode concurrent-session capacity and wraps every
//! `on_process` call in the mode's configured timeout.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use regex::Regex;
use tokio::time::{timeout, Duration};
use tracing::{debug, instrument};
use validator::Validate;

use super::Mode;
use crate::error::EngineError;
use crate::models::{CanHandle, ModeConfig, ModeContext, ProcessOutcome};

/// A mode plus its compiled trigger patterns.
pub struct RegisteredMode {
    mode: Arc<dyn Mode>,
    triggers: Vec<Regex>,
}

impl RegisteredMode {
    pub fn config(&self) -> &ModeConfig {
        self.mode.config()
    }

    /// Compiled trigger patterns, in config order.
    pub fn triggers(&self) -> &[Regex] {
        &self.triggers
    }

    pub fn mode(&self) -> &Arc<dyn Mode> {
        &self.mode
    }
}

/// The ordered mode collection. Registration order is the tie-break order
/// used by the intent analyzer and the selector, so it is part of the
/// engine's observable behavior.
pub struct ModeRegistry {
    modes: Vec<RegisteredMode>,
    index: HashMap<String, usize>,
    /// mode id -> session ids currently holding an activation slot.
    active: Mutex<HashMap<String, HashSet<String>>>,
}

impl ModeRegistry {
    /// Validates and loads the given modes, in order.
    ///
    /// Fails fast on duplicate ids, invalid configs, and trigger patterns
    /// that do not compile.
    pub fn load(modes: Vec<Arc<dyn Mode>>) -> Result<Self, EngineError> {
        let mut registered: Vec<RegisteredMode> = Vec::with_capacity(modes.len());
        let mut index = HashMap::new();

        for mode in modes {
            let config = mode.config();
            config.validate()?;
            if config.min_input_len > config.max_input_len {
                return Err(EngineError::Config(format!(
                    "mode '{}' has min_input_len {} > max_input_len {}",
                    config.id, config.min_input_len, config.max_input_len
                )));
            }
            if index.contains_key(&config.id) {
                return Err(EngineError::Config(format!(
                    "duplicate mode id '{}'",
                    config.id
                )));
            }

            let triggers = config
                .triggers
                .iter()
                .map(|source| Regex::new(source))
                .collect::<Result<Vec<_>, _>>()?;

            index.insert(config.id.clone(), registered.len());
            registered.push(RegisteredMode { mode, triggers });
        }

        debug!(mode_count = registered.len(), "mode registry loaded");
        Ok(Self {
            modes: registered,
            index,
            active: Mutex::new(HashMap::new()),
        })
    }

    /// Looks up a mode by id. Unknown ids are an error, never a default.
    pub fn get(&self, id: &str) -> Result<&RegisteredMode, EngineError> {
        self.index
            .get(id)
            .map(|&i| &self.modes[i])
            .ok_or_else(|| EngineError::InvalidModeReference(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Iterates modes in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredMode> {
        self.modes.iter()
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    /// Sessions currently holding an activation slot for the mode.
    pub fn active_count(&self, id: &str) -> usize {
        let active = self.active.lock().unwrap();
        active.get(id).map(HashSet::len).unwrap_or(0)
    }

    /// Snapshot of all non-zero per-mode active counts.
    pub fn active_counts(&self) -> HashMap<String, usize> {
        let active = self.active.lock().unwrap();
        active
            .iter()
            .filter(|(_, sessions)| !sessions.is_empty())
            .map(|(id, sessions)| (id.clone(), sessions.len()))
            .collect()
    }

    /// Reserves a capacity slot and runs the mode's activation hook.
    ///
    /// The slot is released again if the hook fails, so a failed activation
    /// never leaks capacity.
    #[instrument(skip(self, ctx), fields(session_id = %ctx.session_id))]
    pub async fn activate(&self, id: &str, ctx: &ModeContext) -> Result<(), EngineError> {
        let registered = self.get(id)?;
        let config = registered.config();

        for key in &config.required_context {
            if !ctx.metadata.contains_key(key) {
                return Err(EngineError::Config(format!(
                    "mode '{}' requires context key '{}'",
                    id, key
                )));
            }
        }

        let reserved = {
            let mut active = self.active.lock().unwrap();
            let sessions = active.entry(id.to_string()).or_default();
            if sessions.contains(&ctx.session_id) {
                // Session already holds a slot; re-activation keeps it.
                false
            } else if sessions.len() >= config.max_concurrent_sessions {
                return Err(EngineError::CapacityExceeded {
                    mode_id: id.to_string(),
                    limit: config.max_concurrent_sessions,
                });
            } else {
                sessions.insert(ctx.session_id.clone());
                true
            }
        };

        if let Err(e) = registered.mode.on_activate(ctx).await {
            if reserved {
                self.release(id, &ctx.session_id);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Runs the mode's deactivation hook and releases the capacity slot.
    ///
    /// The slot is released even when the hook fails; a session that left a
    /// mode must never keep occupying its capacity.
    pub async fn deactivate(&self, id: &str, session_id: &str) -> Result<(), EngineError> {
        let registered = self.get(id)?;
        let result = registered.mode.on_deactivate(session_id).await;
        self.release(id, session_id);
        result
    }

    fn release(&self, id: &str, session_id: &str) {
        let mut active = self.active.lock().unwrap();
        if let Some(sessions) = active.get_mut(id) {
            sessions.remove(session_id);
        }
    }

    /// Runs `on_process` under the mode's configured timeout.
    ///
    /// Inputs outside the mode's length bounds produce a failed outcome,
    /// not an error; timeouts and mode-internal errors surface as
    /// `ProcessingTimeout` / `ProcessingFailure`.
    pub async fn process(
        &self,
        id: &str,
        input: &str,
        ctx: &ModeContext,
    ) -> Result<ProcessOutcome, EngineError> {
        let registered = self.get(id)?;
        let config = registered.config();

        let length = input.chars().count();
        if length < config.min_input_len || length > config.max_input_len {
            return Ok(ProcessOutcome::failed(format!(
                "input length {} outside [{}, {}] accepted by mode '{}'",
                length, config.min_input_len, config.max_input_len, id
            )));
        }

        let limit = Duration::from_millis(config.timeout_ms);
        match timeout(limit, registered.mode.on_process(input, ctx)).await {
            Err(_) => Err(EngineError::ProcessingTimeout {
                mode_id: id.to_string(),
                timeout_ms: config.timeout_ms,
            }),
            Ok(Err(e)) => Err(EngineError::ProcessingFailure {
                mode_id: id.to_string(),
                message: e.to_string(),
            }),
            Ok(Ok(outcome)) => Ok(outcome),
        }
    }

    /// Asks one mode to self-score an input. Confidence is clamped to [0,1].
    pub async fn can_handle(
        &self,
        id: &str,
        input: &str,
        ctx: &ModeContext,
    ) -> Result<CanHandle, EngineError> {
        let registered = self.get(id)?;
        let mut result = registered.mode.on_can_handle(input, ctx).await;
        result.confidence = result.confidence.clamp(0.0, 1.0);
        Ok(result)
    }
}
