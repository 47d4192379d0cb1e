//! Flow execution error types.

use thiserror::Error;

/// Flow execution errors.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Malformed step or flow; the step is never attempted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The action executor reported a failure.
    #[error("action failed: {0}")]
    Action(String),

    /// Target resolution exhausted every strategy.
    #[error(transparent)]
    Resolution(#[from] flow_locator::LocatorError),

    /// A bounded wait or step body exceeded its own timeout.
    #[error("step '{step_id}' timed out after {timeout_ms}ms")]
    Timeout { step_id: String, timeout_ms: u64 },

    /// The run's global wall-clock deadline was exceeded.
    #[error("global run timeout exceeded")]
    GlobalTimeout,

    /// Graph compilation failed.
    #[error(transparent)]
    Cycle(#[from] flow_dag::DagError),

    /// Condition evaluation failed.
    #[error(transparent)]
    Condition(#[from] flow_expr::ExprError),

    /// A plugin hook failed. Always downgraded to a warning by the caller.
    #[error("plugin '{plugin}' failed: {reason}")]
    Plugin { plugin: String, reason: String },

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FlowError {
    /// Whether a step retry policy may re-attempt after this error.
    ///
    /// Action failures are retryable. Resolution failures are retryable too,
    /// but only a step that carries a retry spec ever loops, which is
    /// exactly the "retryable if the step policy allows" rule. Validation,
    /// timeout, and run-level errors are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FlowError::Action(_) | FlowError::Resolution(_))
    }
}
