//! Worker-boundary message protocol.
//!
//! The only entry point external collaborators use. Requests arrive as
//! tagged JSON objects; the engine answers with an ordered stream of events:
//! zero or more non-terminal events (`log`, at most one `error`, at most one
//! `success`) followed by exactly one terminal `completed` event per request.
//! The two exceptions carry no request at all: the one-time `ready` signal
//! after bootstrap, and the fatal initialization error.
//!
//! The handler performs no business logic - it is the boundary adapter
//! between the wire format and the coordinator. Unknown request kinds,
//! malformed frames, and requests received while not ready are answered with
//! a single `error` event and no terminal event; nothing is queued.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::coordinator::{ExecutionCoordinator, ExecutionRequest};
use crate::error::EngineError;

/// A request from the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    /// Execute and observe output; never satisfies a challenge.
    Run { code: String },
    /// Two-stage grading: user code, hidden test program, optional `check`.
    Validate {
        code: String,
        #[serde(rename = "testCode", default)]
        test_code: Option<String>,
    },
}

impl From<Request> for ExecutionRequest {
    fn from(request: Request) -> Self {
        match request {
            Request::Run { code } => ExecutionRequest::Run { code },
            Request::Validate { code, test_code } => ExecutionRequest::Validate {
                code,
                test_code: test_code.unwrap_or_default(),
            },
        }
    }
}

/// An event for the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    /// Emitted exactly once, after successful bootstrap.
    Ready,
    /// One streamed line of output.
    Log { content: String },
    /// Classified failure message.
    Error { content: String },
    /// Emitted only on a fully-passing validation.
    Success { content: String },
    /// Terminal event of every serviced request.
    Completed { passed: bool },
}

/// Process-wide state, alive for the worker's whole lifetime. `ready` flips
/// true exactly once, after the harness evaluates; it is never reset -
/// recovery from a failed bootstrap is worker recreation, owned by the host.
#[derive(Debug, Default)]
pub struct RuntimeState {
    pub ready: bool,
    pub harness_names: BTreeSet<String>,
}

/// Message-level state machine exposed across the worker boundary.
pub struct ProtocolHandler {
    events: UnboundedSender<Event>,
    state: RuntimeState,
    coordinator: Option<ExecutionCoordinator>,
}

impl ProtocolHandler {
    /// A handler starts not-ready; it rejects every request until
    /// [`make_ready`](Self::make_ready) hands it a coordinator.
    pub fn new(events: UnboundedSender<Event>) -> Self {
        Self {
            events,
            state: RuntimeState::default(),
            coordinator: None,
        }
    }

    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    /// Flip to ready. Called once, after the bootstrapper reports success.
    pub fn make_ready(&mut self, coordinator: ExecutionCoordinator, harness_names: BTreeSet<String>) {
        self.state = RuntimeState {
            ready: true,
            harness_names,
        };
        self.coordinator = Some(coordinator);
    }

    /// Handle one wire frame to terminal completion. The caller must not
    /// submit the next frame until this returns - the single-flight
    /// discipline the engine depends on.
    pub async fn dispatch(&mut self, frame: &str) {
        let value: serde_json::Value = match serde_json::from_str(frame) {
            Ok(value) => value,
            Err(err) => {
                self.reject(format!("request is not valid JSON: {err}"));
                return;
            }
        };

        if !self.state.ready {
            self.reject("engine is not ready");
            return;
        }

        let kind = match value.get("type").and_then(serde_json::Value::as_str) {
            Some(kind) => kind.to_string(),
            None => {
                self.reject("request is missing a 'type' field");
                return;
            }
        };
        if kind != "run" && kind != "validate" {
            self.reject(format!("unknown request type '{kind}'"));
            return;
        }

        let request: Request = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(err) => {
                self.reject(format!("malformed '{kind}' request: {err}"));
                return;
            }
        };

        // Ready implies an attached coordinator.
        let Some(coordinator) = self.coordinator.as_mut() else {
            self.reject("engine is not ready");
            return;
        };
        coordinator.handle(request.into()).await;
    }

    fn reject(&self, message: impl Into<String>) {
        let error = EngineError::Protocol(message.into());
        tracing::warn!(kind = error.kind(), error = %error, "request rejected");
        let _ = self.events.send(Event::Error {
            content: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_run_request_parses() {
        let request: Request = serde_json::from_str(r#"{"type":"run","code":"print(1)"}"#).unwrap();
        assert_eq!(
            request,
            Request::Run {
                code: "print(1)".to_string()
            }
        );
    }

    #[test]
    fn test_validate_request_parses_with_and_without_test_code() {
        let with: Request =
            serde_json::from_str(r#"{"type":"validate","code":"x = 1","testCode":"assert True"}"#)
                .unwrap();
        assert_eq!(
            with,
            Request::Validate {
                code: "x = 1".to_string(),
                test_code: Some("assert True".to_string()),
            }
        );

        let without: Request =
            serde_json::from_str(r#"{"type":"validate","code":"x = 1"}"#).unwrap();
        assert_eq!(
            without,
            Request::Validate {
                code: "x = 1".to_string(),
                test_code: None,
            }
        );
    }

    #[test]
    fn test_missing_test_code_maps_to_empty_string() {
        let request = Request::Validate {
            code: "x = 1".to_string(),
            test_code: None,
        };
        assert_eq!(
            ExecutionRequest::from(request),
            ExecutionRequest::Validate {
                code: "x = 1".to_string(),
                test_code: String::new(),
            }
        );
    }

    #[test]
    fn test_event_wire_shapes() {
        assert_eq!(
            serde_json::to_string(&Event::Ready).unwrap(),
            r#"{"type":"ready"}"#
        );
        assert_eq!(
            serde_json::to_string(&Event::Log {
                content: "hello".to_string()
            })
            .unwrap(),
            r#"{"type":"log","content":"hello"}"#
        );
        assert_eq!(
            serde_json::to_string(&Event::Completed { passed: true }).unwrap(),
            r#"{"type":"completed","passed":true}"#
        );
    }
}
