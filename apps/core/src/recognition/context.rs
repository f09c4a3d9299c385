//! Context analysis from session telemetry.
//!
//! Derives boolean situational factors and the user's historically
//! preferred modes. Pure over its inputs: the clock and the history window
//! are both supplied by the caller, so identical telemetry always yields
//! the same snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::SessionTelemetry;

/// Work hours; anything outside is the `after_hours` factor.
const WORK_START_HOUR: u32 = 9;
const WORK_END_HOUR: u32 = 17;
/// Sessions longer than this are the `long_session` factor.
const LONG_SESSION_SECS: u64 = 3_600;
/// How many of the user's most recent modes feed the preference ranking.
const PREFERENCE_WINDOW: usize = 10;
/// How many preferred modes the snapshot carries.
const PREFERENCE_TOP: usize = 3;

/// A boolean signal derived from session telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SituationalFactor {
    RecentErrors,
    AfterHours,
    LongSession,
}

impl SituationalFactor {
    pub fn as_str(&self) -> &'static str {
        match self {
            SituationalFactor::RecentErrors => "recent_errors",
            SituationalFactor::AfterHours => "after_hours",
            SituationalFactor::LongSession => "long_session",
        }
    }
}

impl fmt::Display for SituationalFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Situational picture for one recognition call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// The mode the telemetry reports as active, if any.
    pub current_mode: Option<String>,
    /// Factors present right now, in a fixed derivation order.
    pub factors: Vec<SituationalFactor>,
    /// The user's historically preferred modes, most preferred first.
    pub preferred_modes: Vec<String>,
}

/// Derives situational factors and personalized preferences.
pub struct ContextAnalyzer;

impl Default for ContextAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Builds the snapshot from telemetry and the user's recent mode
    /// assignments (newest first, as read from the history log).
    pub fn analyze(
        &self,
        telemetry: &SessionTelemetry,
        recent_modes: &[String],
    ) -> ContextSnapshot {
        let mut factors = Vec::new();
        if telemetry.recent_error_count > 0 {
            factors.push(SituationalFactor::RecentErrors);
        }
        if telemetry.local_hour < WORK_START_HOUR || telemetry.local_hour > WORK_END_HOUR {
            factors.push(SituationalFactor::AfterHours);
        }
        if telemetry.session_duration_secs > LONG_SESSION_SECS {
            factors.push(SituationalFactor::LongSession);
        }

        ContextSnapshot {
            current_mode: telemetry.current_mode.clone(),
            factors,
            preferred_modes: preferred_modes(recent_modes),
        }
    }
}

/// Ranks the distinct modes in the user's last [`PREFERENCE_WINDOW`]
/// assignments by frequency; ties keep the more recently seen mode first.
fn preferred_modes(recent_modes: &[String]) -> Vec<String> {
    let window = &recent_modes[..recent_modes.len().min(PREFERENCE_WINDOW)];

    // (mode, count, first index in the newest-first window)
    let mut ranked: Vec<(&String, usize, usize)> = Vec::new();
    for (position, mode) in window.iter().enumerate() {
        match ranked.iter_mut().find(|(m, _, _)| *m == mode) {
            Some((_, count, _)) => *count += 1,
            None => ranked.push((mode, 1, position)),
        }
    }

    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(PREFERENCE_TOP)
        .map(|(mode, _, _)| mode.clone())
        .collect()
}
