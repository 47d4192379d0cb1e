//! Expression error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExprError {
    #[error("condition parse error: {0}")]
    Parse(String),

    #[error("cannot compare {lhs} with {rhs} using '{op}'")]
    Incomparable {
        op: &'static str,
        lhs: String,
        rhs: String,
    },
}
