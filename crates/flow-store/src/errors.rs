//! Storage error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("flow '{0}' not found")]
    FlowNotFound(String),

    #[error("schedule '{0}' not found")]
    ScheduleNotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}
