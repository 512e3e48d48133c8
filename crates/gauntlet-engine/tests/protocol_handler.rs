//! Protocol-handler behavior at the worker boundary: readiness, unknown
//! request kinds, malformed frames, and a full wire round trip.

mod common;

use common::{drain, error_content, start as boot_engine};
use gauntlet_engine::{boot, EngineConfig, Event, ProtocolHandler};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

#[tokio::test]
async fn requests_before_ready_get_a_not_ready_error_and_no_terminal_event() {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut handler = ProtocolHandler::new(events_tx);

    handler
        .dispatch(r#"{"type":"run","code":"print(1)"}"#)
        .await;

    let events = drain(&mut events_rx);
    assert_eq!(events.len(), 1, "rejected, not queued: {events:?}");
    let content = error_content(&events).expect("a not-ready error");
    assert!(content.contains("not ready"), "{content}");
    assert!(!events
        .iter()
        .any(|event| matches!(event, Event::Completed { .. })));
}

#[tokio::test]
async fn malformed_frames_are_rejected_without_a_terminal_event() {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut handler = ProtocolHandler::new(events_tx);

    handler.dispatch("definitely not json").await;

    let events = drain(&mut events_rx);
    assert_eq!(events.len(), 1);
    let content = error_content(&events).expect("a protocol error");
    assert!(content.contains("not valid JSON"), "{content}");
}

#[tokio::test]
async fn unknown_request_kinds_are_rejected_without_a_terminal_event() {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (coordinator, report) = boot(EngineConfig::default(), events_tx.clone())
        .await
        .expect("engine should boot");
    let mut handler = ProtocolHandler::new(events_tx);
    handler.make_ready(coordinator, report.harness_names);
    assert_eq!(drain(&mut events_rx), vec![Event::Ready]);

    handler.dispatch(r#"{"type":"destroy"}"#).await;

    let events = drain(&mut events_rx);
    assert_eq!(events.len(), 1);
    let content = error_content(&events).expect("a protocol error");
    assert!(content.contains("unknown request type 'destroy'"), "{content}");
}

#[tokio::test]
async fn wire_round_trip_run_request() {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (coordinator, report) = boot(EngineConfig::default(), events_tx.clone())
        .await
        .expect("engine should boot");
    let mut handler = ProtocolHandler::new(events_tx);
    handler.make_ready(coordinator, report.harness_names);
    assert!(handler.state().ready);
    assert_eq!(drain(&mut events_rx), vec![Event::Ready]);

    handler
        .dispatch(r#"{"type":"run","code":"print('ping')"}"#)
        .await;

    assert_eq!(
        drain(&mut events_rx),
        vec![
            Event::Log {
                content: "ping".to_string()
            },
            Event::Completed { passed: false },
        ]
    );
}

#[tokio::test]
async fn wire_validate_without_test_code_terminates_with_failure() {
    let (mut coordinator, mut events_rx) = boot_engine(EngineConfig::default()).await;
    // Route through the handler-shaped conversion: an absent testCode field
    // reaches the coordinator as an empty test program.
    let request: gauntlet_engine::Request =
        serde_json::from_str(r#"{"type":"validate","code":"print(1)"}"#).unwrap();
    let passed = coordinator.handle(request.into()).await;

    assert!(!passed);
    let events = drain(&mut events_rx);
    let content = error_content(&events).expect("the missing-test-code error");
    assert!(content.contains("requires test code"), "{content}");
    assert_eq!(events.last(), Some(&Event::Completed { passed: false }));
}
