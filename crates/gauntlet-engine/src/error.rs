//! Engine error taxonomy.
//!
//! Every failure a request can produce maps onto one of these kinds. All of
//! them except `Initialization` are recoverable: the request that triggered
//! the error is over, but the engine keeps serving. `Initialization` is
//! fatal - the worker never becomes ready and must be recreated by the host.

use thiserror::Error;

/// Classified engine failure.
///
/// The `Display` output is exactly what the host receives as the `error`
/// event content, so each variant carries its kind-specific phrasing here.
/// `Runtime` is the exception: it surfaces the interpreter's own message
/// verbatim (`ExceptionType: detail`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The runtime or harness failed to load. Fatal, no recovery.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// The static policy rejected the source before execution.
    #[error("security check failed: {0}")]
    Security(String),

    /// The source could not be parsed or compiled.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// The wall-clock budget elapsed before execution settled.
    #[error("execution timed out after {0} ms")]
    Timeout(u64),

    /// User code, test code, or the `check` hook raised.
    #[error("{0}")]
    Runtime(String),

    /// Validate was requested without a test program.
    #[error("validation requires test code, but none was provided")]
    MissingTestCode,

    /// Malformed or unknown request, or a request while not ready.
    #[error("{0}")]
    Protocol(String),
}

impl EngineError {
    /// Stable kind label, used for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Initialization(_) => "initialization",
            EngineError::Security(_) => "security",
            EngineError::Syntax(_) => "syntax",
            EngineError::Timeout(_) => "timeout",
            EngineError::Runtime(_) => "runtime",
            EngineError::MissingTestCode => "missing-test-code",
            EngineError::Protocol(_) => "protocol",
        }
    }

    /// Protocol errors answer with an `error` event but no terminal
    /// `completed` event; everything else terminates the request.
    pub fn is_protocol(&self) -> bool {
        matches!(self, EngineError::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_specific_phrasing() {
        assert_eq!(
            EngineError::Security("import of restricted module 'os'".to_string()).to_string(),
            "security check failed: import of restricted module 'os'"
        );
        assert_eq!(
            EngineError::Timeout(5000).to_string(),
            "execution timed out after 5000 ms"
        );
        assert_eq!(
            EngineError::MissingTestCode.to_string(),
            "validation requires test code, but none was provided"
        );
    }

    #[test]
    fn test_runtime_message_is_verbatim() {
        let err = EngineError::Runtime("AssertionError: expected 5".to_string());
        assert_eq!(err.to_string(), "AssertionError: expected 5");
    }

    #[test]
    fn test_protocol_classification() {
        assert!(EngineError::Protocol("engine is not ready".to_string()).is_protocol());
        assert!(!EngineError::Timeout(1).is_protocol());
    }
}
