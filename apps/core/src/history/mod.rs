//! # History Module
//!
//! The append-only record of every mode transition and the analytics
//! derived from it.
//!
//! ## Components
//! - `recorder`: capped in-memory log, query, export/import, retention
//! - `sink`: optional durable storage behind a narrow trait
//! - `analytics`: session summaries and per-user profiles recomputed from
//!   the log (never a second source of truth)

pub mod analytics;
pub mod recorder;
pub mod sink;

pub use analytics::{AnalyticsAggregator, ModePreference, SessionSummary, UserAnalytics};
pub use recorder::{ExportFormat, HistoryQuery, HistoryRecorder};
pub use sink::{HistorySink, JsonFileSink};
