//! Typed transition events.
//!
//! Every state-machine event becomes one `TransitionEvent`. The history
//! recorder consumes it synchronously on the transition path; everything
//! else (display renderers, dashboards) subscribes to the broadcast bus
//! and may lag or drop without affecting the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{ModeAction, ModeCategory};

/// One state-machine event: a mode was activated, confirmed, replaced, or
/// deactivated for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub session_id: String,
    pub user_id: String,
    /// The mode the event is about (the new mode for transitions).
    pub mode_id: String,
    /// The mode's display grouping, so renderers need no registry access.
    pub category: ModeCategory,
    /// The previously active mode, for `transition` events.
    pub from_mode: Option<String>,
    pub action: ModeAction,
    pub timestamp: DateTime<Utc>,
    /// Seconds the mode was active, present on deactivation.
    pub duration_secs: Option<u64>,
    pub confidence: Option<f32>,
    pub reason: Option<String>,
}

/// Fan-out channel for transition events.
///
/// Thin wrapper over a tokio broadcast channel; publishing with no
/// subscribers is a no-op, and slow subscribers lose old events rather
/// than backpressuring the engine.
#[derive(Clone)]
pub struct TransitionBus {
    sender: broadcast::Sender<TransitionEvent>,
}

impl TransitionBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransitionEvent> {
        self.sender.subscribe()
    }

    /// Publishes to all current subscribers. Never fails.
    pub fn publish(&self, event: TransitionEvent) {
        let _ = self.sender.send(event);
    }
}
