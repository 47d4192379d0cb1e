//! DAG compilation error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DagError {
    /// The default-edge subgraph has a cycle; a deterministic order does not
    /// exist and compilation must abort.
    #[error("cycle detected in default-edge graph involving node '{0}'")]
    CycleDetected(String),

    /// An edge references a node id that does not exist.
    #[error("edge references unknown node '{0}'")]
    UnknownNode(String),

    /// The graph has no nodes at all.
    #[error("graph has no nodes")]
    EmptyGraph,
}
