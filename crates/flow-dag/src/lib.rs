//! Graph compilation for node/edge flows.
//!
//! The linear pass runs over a deterministic topological order of the
//! default-edge subgraph; explicit branching uses the walk helpers to pick
//! the next edge from a step's returned label.

pub mod errors;
pub mod order;
pub mod walk;

pub use errors::DagError;
pub use order::topo_order;
pub use walk::{error_edge, next_edge, start_node};
