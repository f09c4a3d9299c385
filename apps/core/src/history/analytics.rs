//! Analytics aggregation.
//!
//! Session summaries and per-user profiles, always recomputed from the
//! history log by folding it entry by entry. Once the recorder starts
//! evicting, these numbers describe the retained window, not all time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::recorder::HistoryRecorder;
use crate::models::{HistoryEntry, ModeAction};

/// How many entries feed each end of the learning-progress comparison.
const LEARNING_WINDOW: usize = 20;
/// Hour buckets within this share of the max bucket count as "peak".
const PEAK_HOUR_RATIO: f32 = 0.8;

/// Rolling description of one session, derived per entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    /// Mode assignments observed (activations and transitions, including
    /// same-mode confirmations).
    pub total_transitions: u64,
    /// Distinct modes used, in first-seen order.
    pub unique_modes: Vec<String>,
    /// Highest assignment count; ties keep the first-seen mode.
    pub most_used_mode: Option<String>,
    /// Running average over entries that carried a confidence.
    pub avg_confidence: f32,
    pub last_activity: Option<DateTime<Utc>>,
}

impl SessionSummary {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            total_transitions: 0,
            unique_modes: Vec::new(),
            most_used_mode: None,
            avg_confidence: 0.0,
            last_activity: None,
        }
    }
}

/// One mode's share of a user's assignments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModePreference {
    pub mode_id: String,
    /// 0.0 - 100.0.
    pub percent: f32,
}

/// Per-user profile derived from the retained log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAnalytics {
    pub user_id: String,
    pub total_entries: usize,
    /// Mode shares, largest first.
    pub mode_preferences: Vec<ModePreference>,
    /// Hours (0-23) whose usage is within 80% of the busiest hour.
    pub peak_hours: Vec<u32>,
    /// 0-100: recent average confidence minus early average confidence.
    pub learning_progress: f32,
}

/// Recomputes summaries and profiles from the recorder's log.
pub struct AnalyticsAggregator {
    recorder: Arc<HistoryRecorder>,
    /// Cache refreshed by the periodic task; reads fall back to a live fold.
    summaries: Mutex<HashMap<String, SessionSummary>>,
}

impl AnalyticsAggregator {
    pub fn new(recorder: Arc<HistoryRecorder>) -> Self {
        Self {
            recorder,
            summaries: Mutex::new(HashMap::new()),
        }
    }

    /// Folds the log into a summary for one session. `None` when the log
    /// holds nothing for it.
    pub fn session_summary(&self, session_id: &str) -> Option<SessionSummary> {
        let entries: Vec<HistoryEntry> = self
            .recorder
            .snapshot()
            .into_iter()
            .filter(|e| e.session_id == session_id)
            .collect();
        if entries.is_empty() {
            return None;
        }

        let mut summary = SessionSummary::new(session_id);
        let mut counts: HashMap<String, u64> = HashMap::new();
        let mut confidence_sum = 0.0f32;
        let mut confidence_count = 0u32;

        for entry in &entries {
            apply_entry(&mut summary, &mut counts, entry);
            if let Some(c) = entry.confidence {
                confidence_sum += c;
                confidence_count += 1;
                summary.avg_confidence = confidence_sum / confidence_count as f32;
            }
        }
        Some(summary)
    }

    /// Folds the log into a profile for one user. `None` when the user has
    /// no entries; never an error.
    pub fn user_analytics(&self, user_id: &str) -> Option<UserAnalytics> {
        let entries: Vec<HistoryEntry> = self
            .recorder
            .snapshot()
            .into_iter()
            .filter(|e| e.user_id == user_id)
            .collect();
        if entries.is_empty() {
            return None;
        }

        Some(UserAnalytics {
            user_id: user_id.to_string(),
            total_entries: entries.len(),
            mode_preferences: mode_preferences(&entries),
            peak_hours: peak_hours(&entries),
            learning_progress: learning_progress(&entries),
        })
    }

    /// Recomputes every session summary into the cache. Idempotent; safe to
    /// run early or twice.
    pub fn refresh(&self) -> usize {
        let mut fresh: HashMap<String, (SessionSummary, HashMap<String, u64>, f32, u32)> =
            HashMap::new();

        for entry in self.recorder.snapshot() {
            let slot = fresh
                .entry(entry.session_id.clone())
                .or_insert_with(|| (SessionSummary::new(&entry.session_id), HashMap::new(), 0.0, 0));
            apply_entry(&mut slot.0, &mut slot.1, &entry);
            if let Some(c) = entry.confidence {
                slot.2 += c;
                slot.3 += 1;
                slot.0.avg_confidence = slot.2 / slot.3 as f32;
            }
        }

        let summaries: HashMap<String, SessionSummary> = fresh
            .into_iter()
            .map(|(id, (summary, _, _, _))| (id, summary))
            .collect();
        let count = summaries.len();
        *self.summaries.lock().unwrap() = summaries;
        debug!(sessions = count, "analytics refresh complete");
        count
    }

    /// Cached summary from the last refresh, if any.
    pub fn cached_summary(&self, session_id: &str) -> Option<SessionSummary> {
        self.summaries.lock().unwrap().get(session_id).cloned()
    }
}

/// Applies one entry to a rolling summary.
fn apply_entry(
    summary: &mut SessionSummary,
    counts: &mut HashMap<String, u64>,
    entry: &HistoryEntry,
) {
    summary.last_activity = Some(entry.timestamp);
    if !matches!(entry.action, ModeAction::Activate | ModeAction::Transition) {
        return;
    }

    summary.total_transitions += 1;
    if !summary.unique_modes.contains(&entry.mode_id) {
        summary.unique_modes.push(entry.mode_id.clone());
    }
    *counts.entry(entry.mode_id.clone()).or_insert(0) += 1;

    // First-seen order breaks count ties, so scan in that order.
    let mut best: Option<(&String, u64)> = None;
    for mode in &summary.unique_modes {
        let count = counts.get(mode).copied().unwrap_or(0);
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((mode, count));
        }
    }
    summary.most_used_mode = best.map(|(mode, _)| mode.clone());
}

fn mode_preferences(entries: &[HistoryEntry]) -> Vec<ModePreference> {
    let assignments: Vec<&HistoryEntry> = entries
        .iter()
        .filter(|e| matches!(e.action, ModeAction::Activate | ModeAction::Transition))
        .collect();
    if assignments.is_empty() {
        return Vec::new();
    }

    let mut counts: Vec<(String, usize)> = Vec::new();
    for entry in &assignments {
        match counts.iter_mut().find(|(mode, _)| *mode == entry.mode_id) {
            Some((_, count)) => *count += 1,
            None => counts.push((entry.mode_id.clone(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    let total = assignments.len() as f32;
    counts
        .into_iter()
        .map(|(mode_id, count)| ModePreference {
            mode_id,
            percent: 100.0 * count as f32 / total,
        })
        .collect()
}

fn peak_hours(entries: &[HistoryEntry]) -> Vec<u32> {
    let mut buckets = [0u32; 24];
    for entry in entries {
        buckets[entry.timestamp.hour() as usize] += 1;
    }
    let max = buckets.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return Vec::new();
    }
    let threshold = PEAK_HOUR_RATIO * max as f32;
    (0..24u32)
        .filter(|&h| buckets[h as usize] as f32 >= threshold)
        .collect()
}

fn learning_progress(entries: &[HistoryEntry]) -> f32 {
    let confidences: Vec<f32> = entries.iter().filter_map(|e| e.confidence).collect();
    if confidences.is_empty() {
        return 0.0;
    }

    let head = &confidences[..confidences.len().min(LEARNING_WINDOW)];
    let tail_start = confidences.len().saturating_sub(LEARNING_WINDOW);
    let tail = &confidences[tail_start..];

    let early: f32 = head.iter().sum::<f32>() / head.len() as f32;
    let recent: f32 = tail.iter().sum::<f32>() / tail.len() as f32;
    (100.0 * (recent - early)).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn entry_at(
        session: &str,
        mode: &str,
        action: ModeAction,
        confidence: Option<f32>,
        timestamp: DateTime<Utc>,
    ) -> HistoryEntry {
        HistoryEntry {
            id: Uuid::new_v4().to_string(),
            session_id: session.to_string(),
            user_id: "u1".to_string(),
            mode_id: mode.to_string(),
            from_mode: None,
            action,
            timestamp,
            duration_secs: None,
            confidence,
            reason: None,
        }
    }

    fn setup() -> (Arc<HistoryRecorder>, AnalyticsAggregator) {
        let recorder = Arc::new(HistoryRecorder::new(1_000));
        let aggregator = AnalyticsAggregator::new(recorder.clone());
        (recorder, aggregator)
    }

    #[test]
    fn test_unknown_session_is_none() {
        let (_, aggregator) = setup();
        assert!(aggregator.session_summary("ghost").is_none());
    }

    #[test]
    fn test_zero_entry_user_is_none_not_panic() {
        let (_, aggregator) = setup();
        assert!(aggregator.user_analytics("nobody").is_none());
    }

    #[test]
    fn test_same_mode_transitions_count_without_duplicating_unique() {
        let (recorder, aggregator) = setup();
        let now = Utc::now();
        recorder.append(entry_at("s1", "thinking", ModeAction::Activate, Some(0.6), now));
        recorder.append(entry_at("s1", "thinking", ModeAction::Transition, Some(0.7), now));
        recorder.append(entry_at("s1", "thinking", ModeAction::Transition, Some(0.8), now));

        let summary = aggregator.session_summary("s1").unwrap();
        assert_eq!(summary.total_transitions, 3);
        assert_eq!(summary.unique_modes, vec!["thinking".to_string()]);
        assert!((summary.avg_confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_most_used_mode_tie_keeps_first_seen() {
        let (recorder, aggregator) = setup();
        let now = Utc::now();
        recorder.append(entry_at("s1", "debugging", ModeAction::Activate, None, now));
        recorder.append(entry_at("s1", "planning", ModeAction::Transition, None, now));

        // One assignment each; debugging was seen first.
        let summary = aggregator.session_summary("s1").unwrap();
        assert_eq!(summary.most_used_mode.as_deref(), Some("debugging"));

        // A second planning assignment breaks the tie the other way.
        recorder.append(entry_at("s1", "planning", ModeAction::Transition, None, now));
        let summary = aggregator.session_summary("s1").unwrap();
        assert_eq!(summary.most_used_mode.as_deref(), Some("planning"));
    }

    #[test]
    fn test_deactivations_do_not_count_as_transitions() {
        let (recorder, aggregator) = setup();
        let now = Utc::now();
        recorder.append(entry_at("s1", "thinking", ModeAction::Activate, None, now));
        recorder.append(entry_at("s1", "thinking", ModeAction::Deactivate, None, now));

        let summary = aggregator.session_summary("s1").unwrap();
        assert_eq!(summary.total_transitions, 1);
    }

    #[test]
    fn test_mode_preferences_are_percentages() {
        let (recorder, aggregator) = setup();
        let now = Utc::now();
        for _ in 0..3 {
            recorder.append(entry_at("s1", "debugging", ModeAction::Transition, None, now));
        }
        recorder.append(entry_at("s1", "thinking", ModeAction::Transition, None, now));

        let analytics = aggregator.user_analytics("u1").unwrap();
        assert_eq!(analytics.mode_preferences[0].mode_id, "debugging");
        assert!((analytics.mode_preferences[0].percent - 75.0).abs() < 1e-4);
        assert!((analytics.mode_preferences[1].percent - 25.0).abs() < 1e-4);
    }

    #[test]
    fn test_peak_hours_within_80_percent_of_max() {
        let (recorder, aggregator) = setup();
        // 10 entries at 09:00, 9 at 14:00, 1 at 22:00.
        let at = |hour: u32| Utc.with_ymd_and_hms(2026, 3, 10, hour, 0, 0).unwrap();
        for _ in 0..10 {
            recorder.append(entry_at("s1", "thinking", ModeAction::Transition, None, at(9)));
        }
        for _ in 0..9 {
            recorder.append(entry_at("s1", "thinking", ModeAction::Transition, None, at(14)));
        }
        recorder.append(entry_at("s1", "thinking", ModeAction::Transition, None, at(22)));

        let analytics = aggregator.user_analytics("u1").unwrap();
        assert_eq!(analytics.peak_hours, vec![9, 14]);
    }

    #[test]
    fn test_learning_progress_improves_with_confidence() {
        let (recorder, aggregator) = setup();
        let start = Utc::now() - Duration::hours(50);
        // 25 early low-confidence entries, then 25 late high-confidence ones.
        for i in 0..25 {
            recorder.append(entry_at(
                "s1",
                "thinking",
                ModeAction::Transition,
                Some(0.3),
                start + Duration::minutes(i),
            ));
        }
        for i in 0..25 {
            recorder.append(entry_at(
                "s1",
                "thinking",
                ModeAction::Transition,
                Some(0.9),
                start + Duration::hours(40) + Duration::minutes(i),
            ));
        }

        let analytics = aggregator.user_analytics("u1").unwrap();
        // Early window avg 0.3, recent window avg 0.9.
        assert!((analytics.learning_progress - 60.0).abs() < 1.0);
    }

    #[test]
    fn test_learning_progress_clamped_at_zero_when_declining() {
        let (recorder, aggregator) = setup();
        let now = Utc::now();
        recorder.append(entry_at("s1", "thinking", ModeAction::Transition, Some(0.9), now));
        recorder.append(entry_at("s1", "thinking", ModeAction::Transition, Some(0.2), now));

        let analytics = aggregator.user_analytics("u1").unwrap();
        assert_eq!(analytics.learning_progress, 0.0);
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let (recorder, aggregator) = setup();
        let now = Utc::now();
        recorder.append(entry_at("s1", "thinking", ModeAction::Activate, Some(0.5), now));
        recorder.append(entry_at("s2", "planning", ModeAction::Activate, Some(0.5), now));

        assert_eq!(aggregator.refresh(), 2);
        assert_eq!(aggregator.refresh(), 2);

        let cached = aggregator.cached_summary("s1").unwrap();
        assert_eq!(cached.total_transitions, 1);
        assert!(aggregator.cached_summary("ghost").is_none());
    }
}
