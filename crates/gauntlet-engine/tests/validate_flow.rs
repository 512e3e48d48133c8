//! Validate-mode grading against a real interpreter: captured output
//! binding, the hidden test program, and the optional `check` hook.

mod common;

use common::{drain, error_content, start};
use gauntlet_engine::{EngineConfig, Event, ExecutionRequest};
use pretty_assertions::assert_eq;

fn validate(code: &str, test_code: &str) -> ExecutionRequest {
    ExecutionRequest::Validate {
        code: code.to_string(),
        test_code: test_code.to_string(),
    }
}

#[tokio::test]
async fn passing_validation_emits_success_then_completed() {
    let (mut coordinator, mut events) = start(EngineConfig::default()).await;

    let passed = coordinator
        .handle(validate("print(\"5\")", "assert output == \"5\""))
        .await;

    assert!(passed);
    assert_eq!(
        drain(&mut events),
        vec![
            Event::Log {
                content: "5".to_string()
            },
            Event::Success {
                content: "all checks passed".to_string()
            },
            Event::Completed { passed: true },
        ]
    );
}

#[tokio::test]
async fn failing_assertion_surfaces_and_fails() {
    let (mut coordinator, mut events) = start(EngineConfig::default()).await;

    let passed = coordinator
        .handle(validate("print(\"5\")", "assert output == \"6\""))
        .await;

    assert!(!passed);
    let events = drain(&mut events);
    let content = error_content(&events).expect("an assertion error event");
    assert!(content.contains("AssertionError"), "{content}");
    assert_eq!(events.last(), Some(&Event::Completed { passed: false }));
}

#[tokio::test]
async fn multi_line_output_binds_with_trailing_newline_stripped() {
    let (mut coordinator, mut events) = start(EngineConfig::default()).await;

    let passed = coordinator
        .handle(validate(
            "print('a')\nprint('b')",
            "assert output == 'a\\nb'",
        ))
        .await;

    assert!(passed, "events: {:?}", drain(&mut events));
}

#[tokio::test]
async fn check_hook_inspects_the_global_namespace() {
    let (mut coordinator, mut events) = start(EngineConfig::default()).await;

    let passed = coordinator
        .handle(validate(
            "x = 10",
            "def check(g):\n    assert g['x'] == 10",
        ))
        .await;

    assert!(passed);
    assert_eq!(
        drain(&mut events),
        vec![
            Event::Success {
                content: "all checks passed".to_string()
            },
            Event::Completed { passed: true },
        ]
    );
}

#[tokio::test]
async fn check_hook_failure_surfaces_its_exception() {
    let (mut coordinator, mut events) = start(EngineConfig::default()).await;

    let passed = coordinator
        .handle(validate(
            "y = 1",
            "def check(g):\n    assert g['x'] == 10",
        ))
        .await;

    assert!(!passed);
    let events = drain(&mut events);
    let content = error_content(&events).expect("the check exception");
    assert!(content.contains("KeyError"), "{content}");
    assert_eq!(events.last(), Some(&Event::Completed { passed: false }));
}

#[tokio::test]
async fn missing_test_code_short_circuits_without_executing() {
    let (mut coordinator, mut events) = start(EngineConfig::default()).await;

    let passed = coordinator.handle(validate("print('never')", "")).await;

    assert!(!passed);
    assert_eq!(
        drain(&mut events),
        vec![
            Event::Error {
                content: "validation requires test code, but none was provided".to_string()
            },
            Event::Completed { passed: false },
        ]
    );
}

#[tokio::test]
async fn failing_user_code_short_circuits_and_restores_the_sink() {
    let (mut coordinator, mut events) = start(EngineConfig::default()).await;

    coordinator.handle(validate("1 / 0", "assert True")).await;
    let events_first = drain(&mut events);
    let content = error_content(&events_first).expect("the division error");
    assert!(content.contains("ZeroDivisionError"), "{content}");
    assert_eq!(
        events_first.last(),
        Some(&Event::Completed { passed: false })
    );

    // The capture guard must have been released: a follow-up validation
    // starts from a clean buffer and passes.
    let passed = coordinator
        .handle(validate("print(\"5\")", "assert output == \"5\""))
        .await;
    assert!(passed);
}

#[tokio::test]
async fn test_code_goes_through_the_same_safety_pipeline() {
    let (mut coordinator, mut events) = start(EngineConfig::default()).await;

    let passed = coordinator
        .handle(validate("print('solution ran')", "import os"))
        .await;

    assert!(!passed);
    let events = drain(&mut events);
    let content = error_content(&events).expect("a security error for the test code");
    assert!(content.starts_with("security check failed:"), "{content}");
    assert!(content.contains("'os'"), "{content}");
    assert_eq!(events.last(), Some(&Event::Completed { passed: false }));
}
