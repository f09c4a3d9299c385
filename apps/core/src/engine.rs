//! The engine service.
//!
//! One explicit instance per process, wired by dependency injection:
//! construct with a config and a loaded registry, call [`Engine::init`] to
//! start the background tasks, [`Engine::shutdown`] to stop them. The
//! recognition pipeline runs intent and context analysis, selects a mode,
//! drives the session state machine, and hands the input to the winning
//! mode's processing hook.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{TransitionBus, TransitionEvent};
use crate::history::{
    AnalyticsAggregator, ExportFormat, HistoryQuery, HistoryRecorder, HistorySink,
    SessionSummary, UserAnalytics,
};
use crate::models::{
    CanHandle, HistoryEntry, ModeAction, ModeContext, ProcessOutcome, RecognitionResult,
    SessionTelemetry,
};
use crate::modes::{ModeRegistry, DEFAULT_MODE};
use crate::recognition::{ContextAnalyzer, IntentAnalyzer, ModeSelector};
use crate::session::SessionManager;

/// Everything one processed input produced.
#[derive(Debug, Clone, Serialize)]
pub struct EngineResponse {
    pub recognition: RecognitionResult,
    /// What the state machine did (`activate` or `transition`).
    pub action: ModeAction,
    pub outcome: ProcessOutcome,
}

/// Point-in-time snapshot for the display collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub active_sessions: usize,
    pub history_entries: usize,
    pub history_evicted: u64,
    pub mode_active_counts: HashMap<String, usize>,
}

/// The recognition-and-transition engine.
pub struct Engine {
    config: EngineConfig,
    registry: Arc<ModeRegistry>,
    intent: IntentAnalyzer,
    context: ContextAnalyzer,
    selector: ModeSelector,
    sessions: Arc<SessionManager>,
    recorder: Arc<HistoryRecorder>,
    analytics: Arc<AnalyticsAggregator>,
    bus: TransitionBus,
    sink: Option<Arc<dyn HistorySink>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Wires an engine from its two injected pieces. Does not start
    /// background work; call [`Engine::init`] for that.
    pub fn new(config: EngineConfig, registry: ModeRegistry) -> Result<Self, EngineError> {
        config.validate()?;
        let registry = Arc::new(registry);
        let bus = TransitionBus::new(config.event_channel_capacity);
        let recorder = Arc::new(HistoryRecorder::new(config.history_cap));
        let sessions = Arc::new(SessionManager::new(
            registry.clone(),
            recorder.clone(),
            bus.clone(),
        ));
        let analytics = Arc::new(AnalyticsAggregator::new(recorder.clone()));

        Ok(Self {
            config,
            registry,
            intent: IntentAnalyzer::new(),
            context: ContextAnalyzer::new(),
            selector: ModeSelector::new(),
            sessions,
            recorder,
            analytics,
            bus,
            sink: None,
            tasks: Vec::new(),
        })
    }

    /// Attaches a durable history sink, loaded at init and appended to by
    /// the cleanup task and shutdown.
    pub fn with_sink(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Loads the sink (if any) and spawns the periodic tasks: analytics
    /// refresh, retention cleanup + persist, and the idle-session sweep.
    pub async fn init(&mut self) -> Result<(), EngineError> {
        if !self.tasks.is_empty() {
            return Err(EngineError::Config("engine already initialized".to_string()));
        }

        if let Some(sink) = &self.sink {
            let loaded = self.recorder.load_from(sink.as_ref()).await?;
            info!(loaded, "history loaded from sink");
        }

        let analytics = self.analytics.clone();
        let refresh_secs = self.config.analytics_refresh_secs;
        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(refresh_secs));
            loop {
                interval.tick().await;
                analytics.refresh();
            }
        }));

        let recorder = self.recorder.clone();
        let sink = self.sink.clone();
        let retention_days = self.config.retention_days;
        let cleanup_secs = self.config.cleanup_interval_secs;
        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(cleanup_secs));
            loop {
                interval.tick().await;
                let cutoff = Utc::now() - chrono::Duration::days(retention_days);
                let removed = recorder.cleanup_older_than(cutoff);
                if removed > 0 {
                    info!(removed, "retention cleanup removed entries");
                }
                if let Some(sink) = &sink {
                    // Persistence is best-effort; the in-memory log stays
                    // authoritative.
                    if let Err(e) = recorder.persist(sink.as_ref()).await {
                        warn!(error = %e, "history persist failed");
                    }
                }
            }
        }));

        let sessions = self.sessions.clone();
        let idle_secs = self.config.session_idle_timeout_secs;
        self.tasks.push(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs((idle_secs / 2).max(1)));
            loop {
                interval.tick().await;
                sessions
                    .sweep_idle(chrono::Duration::seconds(idle_secs as i64))
                    .await;
            }
        }));

        info!("engine initialized");
        Ok(())
    }

    /// Stops the background tasks and flushes the sink one last time.
    pub async fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(sink) = &self.sink {
            if let Err(e) = self.recorder.persist(sink.as_ref()).await {
                warn!(error = %e, "final history persist failed");
            }
        }
        info!("engine shut down");
    }

    /// Classifies one input. Never fails: analyzer-stage trouble degrades
    /// to the default mode at confidence 0.1 with a reasoning note.
    #[instrument(skip(self, input, telemetry), fields(session_id = %telemetry.session_id))]
    pub async fn recognize(
        &self,
        input: &str,
        telemetry: &SessionTelemetry,
    ) -> RecognitionResult {
        if input.trim().is_empty() {
            return self.degraded("empty input");
        }

        let recent = self
            .recorder
            .recent_modes_for_user(&telemetry.user_id, 10);
        let intent = self.intent.analyze(input, &self.registry);
        let snapshot = self.context.analyze(telemetry, &recent);

        // The live state machine outranks what the caller believes.
        let previous = match self.sessions.current_mode(&telemetry.session_id).await {
            Some(mode) => Some(mode),
            None => telemetry.current_mode.clone(),
        };

        self.selector
            .select(&intent, &snapshot, previous.as_deref(), &self.registry)
    }

    fn degraded(&self, note: &str) -> RecognitionResult {
        RecognitionResult {
            recommended_mode: DEFAULT_MODE.to_string(),
            confidence: 0.1,
            reasoning: format!("degraded recognition: {}", note),
            alternative_modes: vec![],
            metadata: HashMap::new(),
        }
    }

    /// The full pipeline: recognize, transition the session, process.
    ///
    /// Transition errors (unknown mode, capacity, required context)
    /// propagate and leave the session's mode unchanged. Processing errors
    /// come back as a failed outcome, never an `Err`, so one bad input does
    /// not cost the caller its session.
    #[instrument(skip(self, input, telemetry), fields(session_id = %telemetry.session_id))]
    pub async fn process(
        &self,
        input: &str,
        telemetry: &SessionTelemetry,
    ) -> Result<EngineResponse, EngineError> {
        let recognition = self.recognize(input, telemetry).await;

        let mut ctx = ModeContext::new(
            telemetry.session_id.as_str(),
            telemetry.user_id.as_str(),
            input,
        );
        ctx.previous_mode = self.sessions.current_mode(&telemetry.session_id).await;
        ctx.confidence = recognition.confidence;

        let action = self
            .sessions
            .transition(
                &ctx,
                &recognition.recommended_mode,
                recognition.confidence,
                &recognition.reasoning,
            )
            .await?;

        let outcome = match self
            .registry
            .process(&recognition.recommended_mode, input, &ctx)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, mode_id = %recognition.recommended_mode, "mode processing failed");
                ProcessOutcome::failed(e.to_string())
            }
        };

        Ok(EngineResponse {
            recognition,
            action,
            outcome,
        })
    }

    /// Surveys every mode's self-assessment of the input.
    pub async fn can_handle(
        &self,
        input: &str,
        telemetry: &SessionTelemetry,
    ) -> Vec<(String, CanHandle)> {
        let ctx = ModeContext::new(
            telemetry.session_id.as_str(),
            telemetry.user_id.as_str(),
            input,
        );
        let surveys = self.registry.iter().map(|registered| {
            let ctx = &ctx;
            async move {
                let mut result = registered.mode().on_can_handle(input, ctx).await;
                result.confidence = result.confidence.clamp(0.0, 1.0);
                (registered.config().id.clone(), result)
            }
        });
        futures::future::join_all(surveys).await
    }

    /// Closes the session and returns how long its mode was active.
    pub async fn close_session(&self, session_id: &str) -> Result<u64, EngineError> {
        self.sessions.close(session_id).await
    }

    /// The session's active mode, if any.
    pub async fn current_mode(&self, session_id: &str) -> Option<String> {
        self.sessions.current_mode(session_id).await
    }

    pub fn query_history(&self, query: &HistoryQuery) -> Vec<HistoryEntry> {
        self.recorder.query(query)
    }

    pub fn export_history(&self, format: ExportFormat) -> Result<String, EngineError> {
        self.recorder.export(format)
    }

    pub fn import_history(&self, data: &str, format: ExportFormat) -> Result<usize, EngineError> {
        self.recorder.import(data, format)
    }

    pub fn session_summary(&self, session_id: &str) -> Option<SessionSummary> {
        self.analytics.session_summary(session_id)
    }

    pub fn user_analytics(&self, user_id: &str) -> Option<UserAnalytics> {
        self.analytics.user_analytics(user_id)
    }

    /// Subscribes to the transition event stream (display collaborator).
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<TransitionEvent> {
        self.bus.subscribe()
    }

    pub async fn status(&self) -> EngineStatus {
        EngineStatus {
            active_sessions: self.sessions.active_session_count().await,
            history_entries: self.recorder.len(),
            history_evicted: self.recorder.evicted_count(),
            mode_active_counts: self.registry.active_counts(),
        }
    }

    /// The loaded registry, for callers that need mode metadata.
    pub fn registry(&self) -> &ModeRegistry {
        &self.registry
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
