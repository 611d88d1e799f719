//! Error types for Formloop
//!
//! Centralized error handling using thiserror. Loop control signals
//! (break/continue) travel through this type as a dedicated variant so the
//! loop executor can catch them without string matching; they are not
//! failures in the domain sense.

use thiserror::Error;

/// Non-local control signal raised by break/continue actions.
///
/// Only a loop executor may catch the carrying error variant. A signal that
/// escapes past its owning loop is a bug in the dispatcher integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopSignal {
    /// Terminate the enclosing loop.
    Break,
    /// Skip the rest of the current iteration.
    Continue,
}

impl LoopSignal {
    /// Action-facing name of the signal ("break" / "continue").
    pub fn name(&self) -> &'static str {
        match self {
            LoopSignal::Break => "break",
            LoopSignal::Continue => "continue",
        }
    }
}

/// All error types that can occur in Formloop
#[derive(Debug, Error)]
pub enum FormloopError {
    /// Loop configuration rejected by validation
    #[error("Invalid loop config: {0}")]
    InvalidLoopConfig(String),

    /// Variable name is not identifier-shaped
    #[error("Invalid variable name: {0:?}")]
    InvalidVariableName(String),

    /// pop() called on an empty scope stack
    #[error("Scope stack underflow: pop on empty stack")]
    ScopeUnderflow,

    /// break/continue executed with no enclosing loop context
    #[error("'{}' used outside of a loop", signal.name())]
    ControlOutsideLoop { signal: LoopSignal },

    /// Internal control-flow signal; caught exclusively by the loop executor
    #[error("loop control signal '{}' escaped its loop", .0.name())]
    Signal(LoopSignal),

    /// Runaway-loop guard tripped; never subject to the error strategy
    #[error("Loop exceeded max iterations ({limit})")]
    MaxIterationsExceeded { limit: u32 },

    /// A single iteration ran past its timeout
    #[error("Iteration timed out after {ms}ms")]
    IterationTimeout { ms: u64 },

    /// The whole loop ran past its timeout
    #[error("Loop timed out after {ms}ms")]
    LoopTimeout { ms: u64 },

    /// Execution was cancelled between iterations
    #[error("Execution cancelled")]
    Cancelled,

    /// Condition expression failed to parse or evaluate; the resolver
    /// downgrades this to `false` instead of propagating it
    #[error("Condition error: {0}")]
    Condition(String),

    /// Action dispatch error
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Form definition error (unknown action group, malformed action)
    #[error("Form error: {0}")]
    Form(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML form-definition parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl FormloopError {
    /// True for the break/continue control signals, which the executor
    /// interprets instead of treating as iteration failures.
    pub fn is_control_signal(&self) -> bool {
        matches!(self, FormloopError::Signal(_))
    }

    /// True for errors that must never be retried or swallowed by the
    /// error-handling strategy (the max-iteration guard and cancellation).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FormloopError::MaxIterationsExceeded { .. } | FormloopError::Cancelled
        )
    }
}

/// Result type alias for Formloop operations
pub type Result<T> = std::result::Result<T, FormloopError>;
