//! Per-request orchestration.
//!
//! The coordinator owns the full lifecycle of one request: safety check →
//! namespace scrub → timed execution → result classification → event
//! emission. It walks `Idle → Checking → RunningUser → [RunningTest →
//! RunningCheck] → Idle`, with every error path returning straight to
//! `Idle`. Exactly one request is in flight at a time; the caller enforces
//! that by not submitting the next request until it has observed the
//! terminal `completed` event.
//!
//! The timeout is a race, not preemption: each interpreter job's reply is
//! awaited under `tokio::time::timeout`. A loser keeps running on the
//! interpreter thread; its output is muted and its reply dropped. If it
//! never settles, only worker recreation (the host's capability) frees the
//! thread again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;

use crate::analyzer::SecurityAnalyzer;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::interpreter::{ExecFailure, InterpreterHost};
use crate::policy::DenyPolicy;
use crate::protocol::Event;
use crate::sink::{CaptureGuard, OutputSink};

/// One unit of work from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionRequest {
    Run { code: String },
    Validate { code: String, test_code: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Checking,
    RunningUser,
    RunningTest,
    RunningCheck,
}

/// Orchestrates requests against the interpreter host.
pub struct ExecutionCoordinator {
    host: InterpreterHost,
    sink: Arc<OutputSink>,
    events: UnboundedSender<Event>,
    policy: DenyPolicy,
    budget: Duration,
    phase: Phase,
}

impl ExecutionCoordinator {
    pub fn new(
        host: InterpreterHost,
        sink: Arc<OutputSink>,
        events: UnboundedSender<Event>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            host,
            sink,
            events,
            policy: config.policy.clone(),
            budget: config.budget(),
            phase: Phase::Idle,
        }
    }

    /// Service one request to terminal completion. Returns whether it
    /// passed (only a fully-clean validate does).
    pub async fn handle(&mut self, request: ExecutionRequest) -> bool {
        self.sink.unmute();
        let mode = match &request {
            ExecutionRequest::Run { .. } => "run",
            ExecutionRequest::Validate { .. } => "validate",
        };
        tracing::info!(mode, "request accepted");

        let outcome = match request {
            ExecutionRequest::Run { code } => self.run_mode(&code).await,
            ExecutionRequest::Validate { code, test_code } => {
                self.validate_mode(&code, &test_code).await
            }
        };
        self.sink.flush();

        let passed = match outcome {
            Ok(passed) => {
                if passed {
                    let _ = self.events.send(Event::Success {
                        content: "all checks passed".to_string(),
                    });
                }
                passed
            }
            Err(error) => {
                tracing::warn!(mode, kind = error.kind(), error = %error, "request failed");
                let _ = self.events.send(Event::Error {
                    content: error.to_string(),
                });
                false
            }
        };
        let _ = self.events.send(Event::Completed { passed });
        self.enter(Phase::Idle);
        passed
    }

    /// Execute-and-observe. Never satisfies a challenge.
    async fn run_mode(&mut self, code: &str) -> Result<bool, EngineError> {
        self.run_user(code).await?;
        Ok(false)
    }

    /// Two-stage grading: user code, then the hidden test program, then the
    /// optional `check` hook. The capture guard is released on every exit
    /// path, restoring the sink to pure streaming.
    async fn validate_mode(&mut self, code: &str, test_code: &str) -> Result<bool, EngineError> {
        if test_code.trim().is_empty() {
            return Err(EngineError::MissingTestCode);
        }
        let capture = self.sink.capture();
        let result = self.validate_stages(code, test_code, &capture).await;
        drop(capture);
        result
    }

    async fn validate_stages(
        &mut self,
        code: &str,
        test_code: &str,
        capture: &CaptureGuard,
    ) -> Result<bool, EngineError> {
        self.run_user(code).await?;

        // The test program sees what the solution printed as a read-only
        // string; `print("5")` must satisfy `assert output == "5"`.
        let output = capture.stdout().trim_end().to_string();
        let reply = self.host.bind_output(output);
        self.await_reply(reply).await?;

        self.enter(Phase::RunningTest);
        self.vet(test_code)?;
        let reply = self.host.exec(test_code.to_string());
        self.await_reply(reply).await?;

        self.enter(Phase::RunningCheck);
        let reply = self.host.invoke_check();
        self.await_reply(reply).await?;

        Ok(true)
    }

    /// The shared safety → scrub → timed-execution pipeline for user code.
    /// The scrub runs before execution, never after, so a failed run's
    /// globals stay inspectable until the next request overwrites them.
    async fn run_user(&mut self, code: &str) -> Result<(), EngineError> {
        self.enter(Phase::Checking);
        self.vet(code)?;

        let reply = self.host.scrub();
        self.await_reply(reply).await?;

        self.enter(Phase::RunningUser);
        let reply = self.host.exec(code.to_string());
        self.await_reply(reply).await
    }

    /// Static analysis; a fresh verdict per call, never cached.
    fn vet(&self, source: &str) -> Result<(), EngineError> {
        let verdict = SecurityAnalyzer::new(&self.policy).inspect(source);
        if verdict.safe() {
            return Ok(());
        }
        if verdict.is_parse_failure() {
            Err(EngineError::Syntax(verdict.summary()))
        } else {
            Err(EngineError::Security(verdict.summary()))
        }
    }

    /// Race an interpreter reply against the wall-clock budget and classify
    /// the outcome. On timeout the sink is muted so a still-running
    /// execution cannot emit events after the terminal one.
    async fn await_reply<T>(
        &self,
        reply: oneshot::Receiver<Result<T, ExecFailure>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.budget, reply).await {
            Err(_) => {
                self.sink.mute();
                Err(EngineError::Timeout(self.budget.as_millis() as u64))
            }
            Ok(Err(_)) => Err(EngineError::Runtime(
                "execution context is no longer available".to_string(),
            )),
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(ExecFailure::Parse(message)))) => Err(EngineError::Syntax(message)),
            Ok(Ok(Err(ExecFailure::Raised(message)))) => Err(EngineError::Runtime(message)),
        }
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            tracing::debug!(from = ?self.phase, to = ?phase, "phase");
            self.phase = phase;
        }
    }
}
