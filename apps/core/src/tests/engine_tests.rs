//! Engine Lifecycle Tests
//!
//! Session state machine invariants, the full process pipeline, event
//! fan-out, and init/shutdown of the background tasks.

use crate::{
    builtin_registry, Engine, EngineConfig, EngineError, HistoryQuery, ModeAction,
    SessionTelemetry, DEFAULT_MODE,
};

fn engine() -> Engine {
    Engine::new(EngineConfig::default(), builtin_registry().unwrap()).unwrap()
}

fn telemetry(session: &str) -> SessionTelemetry {
    SessionTelemetry::new(session, "u1", 10)
}

#[tokio::test]
async fn test_process_activates_and_runs_the_mode() {
    let engine = engine();

    let response = engine
        .process("fix this bug, I got a stack trace", &telemetry("s1"))
        .await
        .unwrap();

    assert_eq!(response.recognition.recommended_mode, "debugging");
    assert_eq!(response.action, ModeAction::Activate);
    assert!(response.outcome.success);
    assert!(response.outcome.output.contains("Triage order"));
    assert_eq!(engine.current_mode("s1").await.as_deref(), Some("debugging"));

    let status = engine.status().await;
    assert_eq!(status.active_sessions, 1);
    assert_eq!(status.mode_active_counts.get("debugging"), Some(&1));
}

#[tokio::test]
async fn test_at_most_one_active_mode_per_session() {
    let engine = engine();
    let t = telemetry("s1");

    let inputs = [
        "fix this bug, I got a stack trace",
        "optimize this loop",
        "review this pull request",
        "ok thanks",
    ];
    for input in inputs {
        engine.process(input, &t).await.unwrap();
        // After every single step the session holds exactly one mode and
        // exactly one registry slot in total.
        assert!(engine.current_mode("s1").await.is_some());
        let status = engine.status().await;
        let total_slots: usize = status.mode_active_counts.values().sum();
        assert_eq!(total_slots, 1, "after '{}'", input);
    }
}

#[tokio::test]
async fn test_same_mode_twice_counts_transitions_once_unique() {
    let engine = engine();
    let t = telemetry("s1");

    engine
        .process("fix this bug, I got a stack trace", &t)
        .await
        .unwrap();
    let second = engine
        .process("fix this bug, I got a stack trace", &t)
        .await
        .unwrap();
    assert_eq!(second.action, ModeAction::Transition);

    let summary = engine.session_summary("s1").unwrap();
    assert_eq!(summary.total_transitions, 2);
    assert_eq!(summary.unique_modes, vec!["debugging".to_string()]);
}

#[tokio::test]
async fn test_mode_change_records_from_mode() {
    let engine = engine();
    let t = telemetry("s1");

    engine
        .process("fix this bug, I got a stack trace", &t)
        .await
        .unwrap();
    let response = engine.process("optimize this loop", &t).await.unwrap();
    assert_eq!(response.recognition.recommended_mode, "optimizing");
    assert_eq!(response.action, ModeAction::Transition);

    let transitions = engine.query_history(&HistoryQuery {
        action: Some(ModeAction::Transition),
        ..Default::default()
    });
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].from_mode.as_deref(), Some("debugging"));
    assert_eq!(transitions[0].mode_id, "optimizing");

    // The old mode's registry slot is released.
    let status = engine.status().await;
    assert_eq!(status.mode_active_counts.get("debugging"), None);
    assert_eq!(status.mode_active_counts.get("optimizing"), Some(&1));
}

#[tokio::test]
async fn test_close_session_flushes_deactivate_synchronously() {
    let engine = engine();
    let t = telemetry("s1");

    engine
        .process("fix this bug, I got a stack trace", &t)
        .await
        .unwrap();
    let duration = engine.close_session("s1").await.unwrap();

    // Entry visible immediately after close returns.
    let deactivations = engine.query_history(&HistoryQuery {
        action: Some(ModeAction::Deactivate),
        ..Default::default()
    });
    assert_eq!(deactivations.len(), 1);
    assert_eq!(deactivations[0].duration_secs, Some(duration));

    assert_eq!(engine.current_mode("s1").await, None);
    let status = engine.status().await;
    assert_eq!(status.active_sessions, 0);
    assert!(status.mode_active_counts.is_empty());
}

#[tokio::test]
async fn test_close_unknown_session_is_an_error() {
    let engine = engine();
    assert!(matches!(
        engine.close_session("ghost").await,
        Err(EngineError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn test_subscribers_see_transition_events() {
    let engine = engine();
    let mut receiver = engine.subscribe();

    engine
        .process("fix this bug, I got a stack trace", &telemetry("s1"))
        .await
        .unwrap();

    let event = receiver.recv().await.unwrap();
    assert_eq!(event.mode_id, "debugging");
    assert_eq!(event.action, ModeAction::Activate);
    // A renderer gets mode id + category and needs nothing else.
    assert_eq!(event.category.label(), "engineering");
}

#[tokio::test]
async fn test_can_handle_survey_covers_every_mode() {
    let engine = engine();

    let survey = engine
        .can_handle("there is a bug I need to fix", &telemetry("s1"))
        .await;
    assert_eq!(survey.len(), 10);

    for (mode_id, result) in &survey {
        assert!(
            (0.0..=1.0).contains(&result.confidence),
            "mode '{}' out of bounds",
            mode_id
        );
    }

    let debugging = survey
        .iter()
        .find(|(mode_id, _)| mode_id == "debugging")
        .unwrap();
    assert!(debugging.1.confidence > 0.5);
}

#[tokio::test]
async fn test_empty_input_degrades_but_keeps_the_session_usable() {
    let engine = engine();
    let t = telemetry("s1");

    let response = engine.process("", &t).await.unwrap();
    assert_eq!(response.recognition.recommended_mode, DEFAULT_MODE);
    assert!((response.recognition.confidence - 0.1).abs() < 1e-6);
    // The default mode rejects the empty input without hurting the session.
    assert!(!response.outcome.success);
    assert_eq!(engine.current_mode("s1").await.as_deref(), Some(DEFAULT_MODE));

    // A later real input re-triggers recognition normally.
    let response = engine
        .process("fix this bug, I got a stack trace", &t)
        .await
        .unwrap();
    assert!(response.outcome.success);
    assert_eq!(engine.current_mode("s1").await.as_deref(), Some("debugging"));
}

#[tokio::test]
async fn test_init_spawns_and_shutdown_stops_background_tasks() {
    let config = EngineConfig {
        analytics_refresh_secs: 1,
        cleanup_interval_secs: 1,
        session_idle_timeout_secs: 2,
        ..Default::default()
    };
    let mut engine = Engine::new(config, builtin_registry().unwrap()).unwrap();

    engine.init().await.unwrap();
    assert!(matches!(
        engine.init().await,
        Err(EngineError::Config(_))
    ));

    engine
        .process("fix this bug, I got a stack trace", &telemetry("s1"))
        .await
        .unwrap();

    // Let the refresh task run at least once.
    tokio::time::sleep(std::time::Duration::from_millis(1_200)).await;
    engine.shutdown().await;

    assert_eq!(engine.current_mode("s1").await.as_deref(), Some("debugging"));
}

#[tokio::test]
async fn test_user_analytics_for_unknown_user_is_none() {
    let engine = engine();
    assert!(engine.user_analytics("nobody").is_none());
    assert!(engine.session_summary("no-session").is_none());
}

#[tokio::test]
async fn test_sessions_do_not_observe_each_other() {
    let engine = engine();

    engine
        .process("fix this bug, I got a stack trace", &telemetry("alpha"))
        .await
        .unwrap();
    engine
        .process("optimize this loop", &telemetry("beta"))
        .await
        .unwrap();

    assert_eq!(engine.current_mode("alpha").await.as_deref(), Some("debugging"));
    assert_eq!(engine.current_mode("beta").await.as_deref(), Some("optimizing"));

    engine.close_session("alpha").await.unwrap();
    assert_eq!(engine.current_mode("beta").await.as_deref(), Some("optimizing"));
}
