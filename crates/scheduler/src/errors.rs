//! Scheduler error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("scheduled run failed: {0}")]
    RunFailed(String),

    #[error(transparent)]
    Store(#[from] pageflow_store::StoreError),
}
