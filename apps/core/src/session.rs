//! Mode session state machine.
//!
//! One record per live session, keyed by session id. A session is always
//! in exactly one of `Idle`, `Active(mode)`, or `Transitioning`, and never
//! holds more than one active mode. Every state change emits one
//! `TransitionEvent`, recorded into history before the call returns and
//! broadcast to external subscribers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::error::EngineError;
use crate::events::{TransitionBus, TransitionEvent};
use crate::history::HistoryRecorder;
use crate::models::{ModeAction, ModeContext};
use crate::modes::ModeRegistry;

/// Lifecycle state of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active(String),
    Transitioning,
}

/// Per-session record, created on first recognized input and discarded
/// after close.
#[derive(Debug, Clone)]
pub struct ModeSession {
    pub session_id: String,
    pub user_id: String,
    pub state: SessionState,
    /// When the current mode became active.
    pub activated_at: Option<DateTime<Utc>>,
    /// Mode assignments in this session, same-mode confirmations included.
    pub transitions: u64,
    pub last_activity: DateTime<Utc>,
}

/// Drives the per-session lifecycle against the registry.
pub struct SessionManager {
    registry: Arc<ModeRegistry>,
    recorder: Arc<HistoryRecorder>,
    bus: TransitionBus,
    sessions: Mutex<HashMap<String, ModeSession>>,
}

impl SessionManager {
    pub fn new(
        registry: Arc<ModeRegistry>,
        recorder: Arc<HistoryRecorder>,
        bus: TransitionBus,
    ) -> Self {
        Self {
            registry,
            recorder,
            bus,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Moves the session to `to_mode`, calling the registry lifecycle hooks.
    ///
    /// - `Idle -> Active(A)`: activates A, emits `activate`.
    /// - `Active(A) -> Active(B)`: activates B before deactivating A, so a
    ///   failed activation leaves the current mode untouched; emits
    ///   `transition`.
    /// - `Active(A) -> Active(A)`: no hook calls, but still counted and
    ///   still emits a `transition` entry.
    ///
    /// Returns the action that was emitted.
    #[instrument(skip(self, ctx), fields(session_id = %ctx.session_id, to_mode = %to_mode))]
    pub async fn transition(
        &self,
        ctx: &ModeContext,
        to_mode: &str,
        confidence: f32,
        reason: &str,
    ) -> Result<ModeAction, EngineError> {
        // Unknown targets are rejected before any state is created.
        self.registry.get(to_mode)?;

        let mut sessions = self.sessions.lock().await;
        let created = !sessions.contains_key(&ctx.session_id);
        let session = sessions
            .entry(ctx.session_id.clone())
            .or_insert_with(|| ModeSession {
                session_id: ctx.session_id.clone(),
                user_id: ctx.user_id.clone(),
                state: SessionState::Idle,
                activated_at: None,
                transitions: 0,
                last_activity: Utc::now(),
            });

        let state = session.state.clone();
        match state {
            SessionState::Idle => {
                if let Err(e) = self.registry.activate(to_mode, ctx).await {
                    if created {
                        sessions.remove(&ctx.session_id);
                    }
                    return Err(e);
                }
                let session = sessions
                    .get_mut(&ctx.session_id)
                    .ok_or_else(|| EngineError::SessionNotFound(ctx.session_id.clone()))?;
                let now = Utc::now();
                session.state = SessionState::Active(to_mode.to_string());
                session.activated_at = Some(now);
                session.transitions += 1;
                session.last_activity = now;
                info!("session activated mode");
                self.emit(ctx, to_mode, None, ModeAction::Activate, now, None, confidence, reason);
                Ok(ModeAction::Activate)
            }
            SessionState::Active(current) if current == to_mode => {
                let now = Utc::now();
                session.transitions += 1;
                session.last_activity = now;
                self.emit(
                    ctx,
                    to_mode,
                    Some(current),
                    ModeAction::Transition,
                    now,
                    None,
                    confidence,
                    reason,
                );
                Ok(ModeAction::Transition)
            }
            SessionState::Active(current) => {
                session.state = SessionState::Transitioning;
                // New mode first: if its activation fails the session falls
                // back to the old mode with nothing torn down.
                if let Err(e) = self.registry.activate(to_mode, ctx).await {
                    if let Some(session) = sessions.get_mut(&ctx.session_id) {
                        session.state = SessionState::Active(current);
                    }
                    return Err(e);
                }
                if let Err(e) = self.registry.deactivate(&current, &ctx.session_id).await {
                    // Slot is released regardless; the hook failure is not
                    // allowed to wedge the session.
                    warn!(mode_id = %current, error = %e, "deactivation hook failed");
                }
                let session = sessions
                    .get_mut(&ctx.session_id)
                    .ok_or_else(|| EngineError::SessionNotFound(ctx.session_id.clone()))?;
                let now = Utc::now();
                session.state = SessionState::Active(to_mode.to_string());
                session.activated_at = Some(now);
                session.transitions += 1;
                session.last_activity = now;
                info!(from_mode = %current, "session transitioned");
                self.emit(
                    ctx,
                    to_mode,
                    Some(current),
                    ModeAction::Transition,
                    now,
                    None,
                    confidence,
                    reason,
                );
                Ok(ModeAction::Transition)
            }
            SessionState::Transitioning => Err(EngineError::Config(format!(
                "session '{}' is mid-transition",
                ctx.session_id
            ))),
        }
    }

    /// Closes the session: deactivates its mode, emits `deactivate` with
    /// the active duration, and discards the record. The history entry is
    /// recorded before this returns.
    #[instrument(skip(self))]
    pub async fn close(&self, session_id: &str) -> Result<u64, EngineError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .remove(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        let duration = match &session.state {
            SessionState::Active(mode_id) => {
                if let Err(e) = self.registry.deactivate(mode_id, session_id).await {
                    warn!(mode_id = %mode_id, error = %e, "deactivation hook failed on close");
                }
                let now = Utc::now();
                let duration = session
                    .activated_at
                    .map(|at| (now - at).num_seconds().max(0) as u64)
                    .unwrap_or(0);
                let ctx = ModeContext {
                    session_id: session.session_id.clone(),
                    user_id: session.user_id.clone(),
                    input: String::new(),
                    timestamp: now,
                    previous_mode: Some(mode_id.clone()),
                    confidence: 0.0,
                    metadata: HashMap::new(),
                };
                self.emit(
                    &ctx,
                    mode_id,
                    None,
                    ModeAction::Deactivate,
                    now,
                    Some(duration),
                    0.0,
                    "session closed",
                );
                duration
            }
            _ => 0,
        };

        info!(duration_secs = duration, "session closed");
        Ok(duration)
    }

    /// Closes every session idle longer than `max_idle`. Returns how many
    /// were closed.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let stale: Vec<String> = {
            let sessions = self.sessions.lock().await;
            sessions
                .values()
                .filter(|s| s.last_activity < cutoff)
                .map(|s| s.session_id.clone())
                .collect()
        };

        let mut closed = 0;
        for session_id in stale {
            match self.close(&session_id).await {
                Ok(_) => closed += 1,
                // Raced with an explicit close; nothing to do.
                Err(EngineError::SessionNotFound(_)) => {}
                Err(e) => warn!(session_id = %session_id, error = %e, "idle sweep close failed"),
            }
        }
        if closed > 0 {
            info!(closed, "idle sweep closed sessions");
        }
        closed
    }

    /// The session's active mode, if it has one.
    pub async fn current_mode(&self, session_id: &str) -> Option<String> {
        let sessions = self.sessions.lock().await;
        sessions.get(session_id).and_then(|s| match &s.state {
            SessionState::Active(mode) => Some(mode.clone()),
            _ => None,
        })
    }

    /// Mode assignments counted for the session so far.
    pub async fn transition_count(&self, session_id: &str) -> Option<u64> {
        let sessions = self.sessions.lock().await;
        sessions.get(session_id).map(|s| s.transitions)
    }

    /// Sessions currently holding an active mode.
    pub async fn active_session_count(&self) -> usize {
        let sessions = self.sessions.lock().await;
        sessions
            .values()
            .filter(|s| matches!(s.state, SessionState::Active(_)))
            .count()
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &self,
        ctx: &ModeContext,
        mode_id: &str,
        from_mode: Option<String>,
        action: ModeAction,
        timestamp: DateTime<Utc>,
        duration_secs: Option<u64>,
        confidence: f32,
        reason: &str,
    ) {
        let category = match self.registry.get(mode_id) {
            Ok(registered) => registered.config().category,
            // Emitters only pass ids they just resolved; keep the event
            // rather than dropping it if that ever changes.
            Err(_) => crate::models::ModeCategory::Meta,
        };
        let event = TransitionEvent {
            session_id: ctx.session_id.clone(),
            user_id: ctx.user_id.clone(),
            mode_id: mode_id.to_string(),
            category,
            from_mode,
            action,
            timestamp,
            duration_secs,
            confidence: if action == ModeAction::Deactivate {
                None
            } else {
                Some(confidence)
            },
            reason: if reason.is_empty() {
                None
            } else {
                Some(reason.to_string())
            },
        };
        self.recorder.record(&event);
        self.bus.publish(event);
    }
}
