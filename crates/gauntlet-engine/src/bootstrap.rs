//! Engine assembly.
//!
//! Brings the interpreter up and wires the pipeline together: output sink,
//! interpreter host, coordinator. Boot happens once per worker; there is no
//! retry path. Recovery from a failed boot is recreating the worker, which
//! belongs to the host.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::config::EngineConfig;
use crate::coordinator::ExecutionCoordinator;
use crate::error::EngineError;
use crate::interpreter::{BootReport, InterpreterHost};
use crate::protocol::Event;
use crate::sink::OutputSink;

/// Boot the engine: spawn the interpreter thread, wait for the harness to
/// evaluate, and emit the lifecycle event - `ready` on success, one fatal
/// `error` otherwise.
pub async fn boot(
    config: EngineConfig,
    events: UnboundedSender<Event>,
) -> Result<(ExecutionCoordinator, BootReport), EngineError> {
    let sink = Arc::new(OutputSink::new(events.clone()));
    let (host, booted) = InterpreterHost::spawn(Arc::clone(&sink));

    let outcome = booted
        .await
        .unwrap_or_else(|_| Err("interpreter thread exited during startup".to_string()));

    match outcome {
        Ok(report) => {
            tracing::info!(harness_names = report.harness_names.len(), "engine ready");
            let _ = events.send(Event::Ready);
            let coordinator = ExecutionCoordinator::new(host, sink, events, &config);
            Ok((coordinator, report))
        }
        Err(message) => {
            let error = EngineError::Initialization(message);
            tracing::error!(error = %error, "bootstrap failed");
            let _ = events.send(Event::Error {
                content: error.to_string(),
            });
            Err(error)
        }
    }
}
