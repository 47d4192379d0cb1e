//! Graph-walk helpers: start selection and edge choice.

use pageflow_core_types::{FlowEdge, FlowNode};

/// Label used by edges that catch unrecoverable step failures.
pub const ERROR_EDGE_LABEL: &str = "onError";

/// Pick the node a walk starts at: the explicit `start`-typed node, else the
/// unique node with zero in-degree, else the first node in list order.
pub fn start_node<'a>(nodes: &'a [FlowNode], edges: &[FlowEdge]) -> Option<&'a FlowNode> {
    if let Some(explicit) = nodes.iter().find(|n| n.is_start()) {
        return Some(explicit);
    }

    let mut roots = nodes
        .iter()
        .filter(|n| !edges.iter().any(|e| e.to == n.id));
    match (roots.next(), roots.next()) {
        (Some(root), None) => Some(root),
        _ => nodes.first(),
    }
}

/// Choose the outgoing edge for a step's returned label: exact label match
/// first, then the unlabeled/default edge.
pub fn next_edge<'a>(
    edges: &'a [FlowEdge],
    from: &str,
    label: Option<&str>,
) -> Option<&'a FlowEdge> {
    let outgoing: Vec<&FlowEdge> = edges.iter().filter(|e| e.from == from).collect();

    if let Some(wanted) = label {
        if let Some(exact) = outgoing
            .iter()
            .find(|e| e.label.as_deref() == Some(wanted))
        {
            return Some(exact);
        }
    }

    outgoing.into_iter().find(|e| e.is_default())
}

/// The `onError` edge out of a node, if any.
pub fn error_edge<'a>(edges: &'a [FlowEdge], from: &str) -> Option<&'a FlowEdge> {
    edges
        .iter()
        .find(|e| e.from == from && e.label.as_deref() == Some(ERROR_EDGE_LABEL))
}
