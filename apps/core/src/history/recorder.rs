//! History recorder.
//!
//! Append-only, capped, in-memory log of transition events. The append +
//! eviction sequence is the single mutex-guarded writer path in the
//! engine; everything else reads snapshots. Once eviction starts, derived
//! summaries become approximate - by design the oldest entries are simply
//! gone, they are not re-aggregated anywhere.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use super::sink::HistorySink;
use crate::error::EngineError;
use crate::events::TransitionEvent;
use crate::models::{HistoryEntry, ModeAction};

/// Filter set for history queries. All fields are conjunctive.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub mode_id: Option<String>,
    pub action: Option<ModeAction>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            session_id: None,
            user_id: None,
            mode_id: None,
            action: None,
            from_date: None,
            to_date: None,
            limit: 100,
            offset: 0,
        }
    }
}

/// Wire format for history export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Full JSON array; round-trips every field.
    Structured,
    /// Tab-separated table with the fixed column order
    /// `[id, session_id, user_id, mode_id, action, timestamp, duration,
    /// confidence]`. `from_mode` and `reason` are not table columns and do
    /// not survive a table round-trip.
    Table,
}

const TABLE_HEADER: &str = "id\tsession_id\tuser_id\tmode_id\taction\ttimestamp\tduration\tconfidence";

struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
    /// Entries dropped by cap eviction since startup.
    evicted: u64,
    /// Entries ever appended, for the persistence cursor.
    total_appended: u64,
    /// Append count already handed to the sink.
    persist_cursor: u64,
}

/// The append-only event log.
pub struct HistoryRecorder {
    log: Mutex<HistoryLog>,
    cap: usize,
}

impl HistoryRecorder {
    pub fn new(cap: usize) -> Self {
        Self {
            log: Mutex::new(HistoryLog {
                entries: VecDeque::new(),
                evicted: 0,
                total_appended: 0,
                persist_cursor: 0,
            }),
            cap,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Records one state-machine event as a fresh entry.
    pub fn record(&self, event: &TransitionEvent) {
        let entry = HistoryEntry {
            id: Uuid::new_v4().to_string(),
            session_id: event.session_id.clone(),
            user_id: event.user_id.clone(),
            mode_id: event.mode_id.clone(),
            from_mode: event.from_mode.clone(),
            action: event.action,
            timestamp: event.timestamp,
            duration_secs: event.duration_secs,
            confidence: event.confidence,
            reason: event.reason.clone(),
        };
        self.append(entry);
    }

    /// Appends an already-formed entry (import, sink load).
    pub fn append(&self, entry: HistoryEntry) {
        let mut log = self.log.lock().unwrap();
        log.entries.push_back(entry);
        log.total_appended += 1;
        while log.entries.len() > self.cap {
            log.entries.pop_front();
            log.evicted += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.log.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries dropped by cap eviction since startup.
    pub fn evicted_count(&self) -> u64 {
        self.log.lock().unwrap().evicted
    }

    /// Clone of the current log, oldest first.
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.log.lock().unwrap().entries.iter().cloned().collect()
    }

    /// Filtered query, newest first.
    pub fn query(&self, query: &HistoryQuery) -> Vec<HistoryEntry> {
        let mut matched: Vec<HistoryEntry> = {
            let log = self.log.lock().unwrap();
            log.entries
                .iter()
                .filter(|e| {
                    query.session_id.as_deref().map_or(true, |s| e.session_id == s)
                        && query.user_id.as_deref().map_or(true, |u| e.user_id == u)
                        && query.mode_id.as_deref().map_or(true, |m| e.mode_id == m)
                        && query.action.map_or(true, |a| e.action == a)
                        && query.from_date.map_or(true, |d| e.timestamp >= d)
                        && query.to_date.map_or(true, |d| e.timestamp <= d)
                })
                .cloned()
                .collect()
        };
        // Stable sort: ties keep append order, then the reverse scan below
        // yields newest-first.
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect()
    }

    /// The user's most recent mode assignments (activate/transition),
    /// newest first. Feeds the context analyzer's preference ranking.
    pub fn recent_modes_for_user(&self, user_id: &str, limit: usize) -> Vec<String> {
        let log = self.log.lock().unwrap();
        log.entries
            .iter()
            .rev()
            .filter(|e| {
                e.user_id == user_id
                    && matches!(e.action, ModeAction::Activate | ModeAction::Transition)
            })
            .map(|e| e.mode_id.clone())
            .take(limit)
            .collect()
    }

    /// Serializes the whole log in the given format.
    pub fn export(&self, format: ExportFormat) -> Result<String, EngineError> {
        let entries = self.snapshot();
        match format {
            ExportFormat::Structured => Ok(serde_json::to_string_pretty(&entries)?),
            ExportFormat::Table => {
                let mut out = String::from(TABLE_HEADER);
                out.push('\n');
                for e in &entries {
                    out.push_str(&format!(
                        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
                        e.id,
                        e.session_id,
                        e.user_id,
                        e.mode_id,
                        e.action,
                        e.timestamp.to_rfc3339(),
                        e.duration_secs.map_or("-".to_string(), |d| d.to_string()),
                        e.confidence.map_or("-".to_string(), |c| c.to_string()),
                    ));
                }
                Ok(out)
            }
        }
    }

    /// Parses an export and appends every entry. Returns the count.
    pub fn import(&self, data: &str, format: ExportFormat) -> Result<usize, EngineError> {
        let entries = match format {
            ExportFormat::Structured => serde_json::from_str::<Vec<HistoryEntry>>(data)?,
            ExportFormat::Table => parse_table(data)?,
        };
        let count = entries.len();
        for entry in entries {
            self.append(entry);
        }
        Ok(count)
    }

    /// Removes entries older than the cutoff. Returns the removed count.
    pub fn cleanup_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut log = self.log.lock().unwrap();
        let before = log.entries.len();
        log.entries.retain(|e| e.timestamp >= cutoff);
        let removed = before - log.entries.len();
        if removed > 0 {
            debug!(removed, "retention cleanup purged history entries");
        }
        removed
    }

    /// Appends every not-yet-persisted entry to the sink.
    ///
    /// If eviction outran persistence the evicted entries are gone; that
    /// window is logged, not recovered.
    pub async fn persist(&self, sink: &dyn HistorySink) -> Result<usize, EngineError> {
        let (batch, cursor) = {
            let log = self.log.lock().unwrap();
            let oldest_available = log.total_appended - log.entries.len() as u64;
            if log.persist_cursor < oldest_available {
                warn!(
                    lost = oldest_available - log.persist_cursor,
                    "entries evicted before they could be persisted"
                );
            }
            let start = log.persist_cursor.max(oldest_available) - oldest_available;
            let batch: Vec<HistoryEntry> =
                log.entries.iter().skip(start as usize).cloned().collect();
            (batch, log.total_appended)
        };

        if batch.is_empty() {
            return Ok(0);
        }
        sink.append_all(&batch).await?;
        self.log.lock().unwrap().persist_cursor = cursor;
        Ok(batch.len())
    }

    /// Loads all entries from the sink into the log. Loaded entries count
    /// as already persisted.
    pub async fn load_from(&self, sink: &dyn HistorySink) -> Result<usize, EngineError> {
        let entries = sink.load_all().await?;
        let count = entries.len();
        for entry in entries {
            self.append(entry);
        }
        let mut log = self.log.lock().unwrap();
        log.persist_cursor = log.total_appended;
        Ok(count)
    }
}

fn parse_table(data: &str) -> Result<Vec<HistoryEntry>, EngineError> {
    let mut entries = Vec::new();
    for (number, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed == TABLE_HEADER {
            continue;
        }
        let fields: Vec<&str> = trimmed.split('\t').collect();
        if fields.len() != 8 {
            return Err(EngineError::Serialization(format!(
                "table line {} has {} columns, expected 8",
                number + 1,
                fields.len()
            )));
        }
        let action = ModeAction::parse(fields[4]).ok_or_else(|| {
            EngineError::Serialization(format!("unknown action '{}' on line {}", fields[4], number + 1))
        })?;
        let timestamp = DateTime::parse_from_rfc3339(fields[5])?.with_timezone(&Utc);
        let duration_secs = parse_optional(fields[6], number + 1)?;
        let confidence = parse_optional(fields[7], number + 1)?;

        entries.push(HistoryEntry {
            id: fields[0].to_string(),
            session_id: fields[1].to_string(),
            user_id: fields[2].to_string(),
            mode_id: fields[3].to_string(),
            from_mode: None,
            action,
            timestamp,
            duration_secs,
            confidence,
            reason: None,
        });
    }
    Ok(entries)
}

fn parse_optional<T: std::str::FromStr>(field: &str, line: usize) -> Result<Option<T>, EngineError> {
    if field == "-" {
        return Ok(None);
    }
    field
        .parse::<T>()
        .map(Some)
        .map_err(|_| EngineError::Serialization(format!("bad value '{}' on line {}", field, line)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(session: &str, mode: &str, action: ModeAction, ago_days: i64) -> HistoryEntry {
        HistoryEntry {
            id: Uuid::new_v4().to_string(),
            session_id: session.to_string(),
            user_id: "u1".to_string(),
            mode_id: mode.to_string(),
            from_mode: None,
            action,
            timestamp: Utc::now() - Duration::days(ago_days),
            duration_secs: None,
            confidence: Some(0.7),
            reason: None,
        }
    }

    #[test]
    fn test_cap_eviction_drops_oldest() {
        let recorder = HistoryRecorder::new(3);
        for i in 0..5 {
            let mut e = entry("s1", "thinking", ModeAction::Transition, 0);
            e.id = format!("e{}", i);
            recorder.append(e);
        }

        assert_eq!(recorder.len(), 3);
        assert_eq!(recorder.evicted_count(), 2);
        let ids: Vec<String> = recorder.snapshot().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["e2", "e3", "e4"]);
    }

    #[test]
    fn test_query_never_exceeds_cap() {
        let recorder = HistoryRecorder::new(10);
        for _ in 0..25 {
            recorder.append(entry("s1", "thinking", ModeAction::Transition, 0));
        }

        let results = recorder.query(&HistoryQuery {
            limit: 1_000,
            ..Default::default()
        });
        assert_eq!(results.len(), 10);
    }

    #[test]
    fn test_query_filters_and_sorts_newest_first() {
        let recorder = HistoryRecorder::new(100);
        recorder.append(entry("s1", "thinking", ModeAction::Activate, 3));
        recorder.append(entry("s1", "debugging", ModeAction::Transition, 2));
        recorder.append(entry("s2", "planning", ModeAction::Activate, 1));
        recorder.append(entry("s1", "debugging", ModeAction::Deactivate, 0));

        let all = recorder.query(&HistoryQuery::default());
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].action, ModeAction::Deactivate);
        assert_eq!(all[3].action, ModeAction::Activate);

        let s1_only = recorder.query(&HistoryQuery {
            session_id: Some("s1".to_string()),
            ..Default::default()
        });
        assert_eq!(s1_only.len(), 3);

        let debugging = recorder.query(&HistoryQuery {
            mode_id: Some("debugging".to_string()),
            action: Some(ModeAction::Transition),
            ..Default::default()
        });
        assert_eq!(debugging.len(), 1);
    }

    #[test]
    fn test_query_date_window_and_pagination() {
        let recorder = HistoryRecorder::new(100);
        for days in 0..6 {
            recorder.append(entry("s1", "thinking", ModeAction::Transition, days));
        }

        let recent = recorder.query(&HistoryQuery {
            from_date: Some(Utc::now() - Duration::days(2)),
            ..Default::default()
        });
        assert_eq!(recent.len(), 3);

        let page = recorder.query(&HistoryQuery {
            limit: 2,
            offset: 2,
            ..Default::default()
        });
        assert_eq!(page.len(), 2);
    }

    #[test]
    fn test_structured_round_trip_preserves_entry_set() {
        let source = HistoryRecorder::new(100);
        let mut e1 = entry("s1", "debugging", ModeAction::Transition, 1);
        e1.from_mode = Some("thinking".to_string());
        e1.reason = Some("keyword match".to_string());
        source.append(e1);
        source.append(entry("s2", "planning", ModeAction::Activate, 0));

        let exported = source.export(ExportFormat::Structured).unwrap();
        let target = HistoryRecorder::new(100);
        let imported = target.import(&exported, ExportFormat::Structured).unwrap();

        assert_eq!(imported, 2);
        let mut a = source.snapshot();
        let mut b = target.snapshot();
        a.sort_by(|x, y| x.id.cmp(&y.id));
        b.sort_by(|x, y| x.id.cmp(&y.id));
        assert_eq!(a, b);
    }

    #[test]
    fn test_table_round_trip_preserves_exported_columns() {
        let source = HistoryRecorder::new(100);
        let mut e = entry("s1", "debugging", ModeAction::Transition, 1);
        e.duration_secs = Some(120);
        e.from_mode = Some("thinking".to_string());
        source.append(e);

        let exported = source.export(ExportFormat::Table).unwrap();
        assert!(exported.starts_with(TABLE_HEADER));

        let target = HistoryRecorder::new(100);
        let imported = target.import(&exported, ExportFormat::Table).unwrap();
        assert_eq!(imported, 1);

        let original = &source.snapshot()[0];
        let round_tripped = &target.snapshot()[0];
        assert_eq!(round_tripped.id, original.id);
        assert_eq!(round_tripped.session_id, original.session_id);
        assert_eq!(round_tripped.mode_id, original.mode_id);
        assert_eq!(round_tripped.action, original.action);
        assert_eq!(round_tripped.duration_secs, original.duration_secs);
        assert_eq!(round_tripped.confidence, original.confidence);
        // Not table columns, by format definition.
        assert_eq!(round_tripped.from_mode, None);
        assert_eq!(round_tripped.reason, None);
    }

    #[test]
    fn test_table_import_rejects_malformed_lines() {
        let recorder = HistoryRecorder::new(100);
        let err = recorder
            .import("id\tonly\tthree", ExportFormat::Table)
            .unwrap_err();
        assert!(matches!(err, EngineError::Serialization(_)));
    }

    #[test]
    fn test_cleanup_removes_exactly_the_old_entries() {
        let recorder = HistoryRecorder::new(100);
        recorder.append(entry("s1", "thinking", ModeAction::Activate, 91));
        recorder.append(entry("s1", "thinking", ModeAction::Transition, 91));
        recorder.append(entry("s1", "debugging", ModeAction::Transition, 10));
        recorder.append(entry("s1", "debugging", ModeAction::Deactivate, 0));

        let removed = recorder.cleanup_older_than(Utc::now() - Duration::days(90));
        assert_eq!(removed, 2);
        assert_eq!(recorder.len(), 2);
        assert!(recorder
            .snapshot()
            .iter()
            .all(|e| e.timestamp >= Utc::now() - Duration::days(90)));
    }

    #[test]
    fn test_recent_modes_for_user_skips_deactivations() {
        let recorder = HistoryRecorder::new(100);
        recorder.append(entry("s1", "thinking", ModeAction::Activate, 3));
        recorder.append(entry("s1", "debugging", ModeAction::Transition, 2));
        recorder.append(entry("s1", "debugging", ModeAction::Deactivate, 1));
        let mut other = entry("s2", "planning", ModeAction::Activate, 0);
        other.user_id = "someone-else".to_string();
        recorder.append(other);

        let modes = recorder.recent_modes_for_user("u1", 10);
        assert_eq!(modes, vec!["debugging".to_string(), "thinking".to_string()]);
    }
}
