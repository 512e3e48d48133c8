//! Gauntlet Engine - sandboxed execution core
//!
//! Runs untrusted, user-submitted Python for a coding-challenge platform:
//! - Static AST vetting against a configurable deny-list
//! - One long-lived embedded interpreter with a scrubbed shared namespace
//! - Wall-clock-budgeted execution with streamed output
//! - A grading mode that replays captured output into a hidden test program
//!
//! The engine is deliberately not a hardened multi-tenant sandbox: the
//! deny-list is defense-in-depth against obviously dangerous APIs, one
//! request is serviced at a time, and a non-cooperative infinite loop is
//! only truly contained by the host tearing the worker down.

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Public API modules
pub mod analyzer;
pub mod bootstrap;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod interpreter;
pub mod policy;
pub mod protocol;
pub mod sink;

// Re-export commonly used types
pub use analyzer::{SecurityAnalyzer, SecurityVerdict, Violation};
pub use bootstrap::boot;
pub use config::{ConfigError, EngineConfig, DEFAULT_TIMEOUT_MS};
pub use coordinator::{ExecutionCoordinator, ExecutionRequest};
pub use error::EngineError;
pub use interpreter::{BootReport, ExecFailure, InterpreterHost};
pub use policy::DenyPolicy;
pub use protocol::{Event, ProtocolHandler, Request, RuntimeState};
pub use sink::{CaptureGuard, Channel, OutputEvent, OutputSink};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoke() {
        // Smoke test to verify the crate builds and tests run
        assert_eq!(VERSION, "0.1.0");
    }
}
