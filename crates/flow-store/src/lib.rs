//! Storage boundary for flows, run records, and schedules.
//!
//! The engine persists through these traits only; the in-memory
//! implementations back tests and embedded hosts. Durable backends live on
//! the host side of the boundary.

pub mod api;
pub mod errors;
pub mod memory;

pub use api::{FlowStore, RunStore, ScheduleStore};
pub use errors::StoreError;
pub use memory::{InMemoryFlowStore, InMemoryRunStore, InMemoryScheduleStore};

pub type StoreResult<T> = Result<T, StoreError>;
