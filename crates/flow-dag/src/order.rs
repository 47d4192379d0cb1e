//! Deterministic topological ordering over the default-edge subgraph.

use std::collections::{HashMap, HashSet};

use pageflow_core_types::{FlowEdge, FlowNode};
use tracing::debug;

use crate::errors::DagError;
use crate::walk::start_node;

/// Compute the linear execution order for a node/edge graph.
///
/// Only default edges participate. Nodes that cannot be reached from the
/// start node through default edges are excluded; they remain reachable via
/// the explicit graph walk. The order is deterministic: among ready nodes,
/// node-list position breaks ties. A cycle in the reachable subgraph aborts
/// with [`DagError::CycleDetected`].
pub fn topo_order(nodes: &[FlowNode], edges: &[FlowEdge]) -> Result<Vec<String>, DagError> {
    if nodes.is_empty() {
        return Err(DagError::EmptyGraph);
    }

    let known: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    for edge in edges {
        if !known.contains(edge.from.as_str()) {
            return Err(DagError::UnknownNode(edge.from.clone()));
        }
        if !known.contains(edge.to.as_str()) {
            return Err(DagError::UnknownNode(edge.to.clone()));
        }
    }

    let default_edges: Vec<&FlowEdge> = edges.iter().filter(|e| e.is_default()).collect();

    let start = start_node(nodes, edges).expect("non-empty graph has a start node");
    let reachable = reach_from(&start.id, &default_edges);
    debug!(
        "topological pass covers {}/{} nodes from start '{}'",
        reachable.len(),
        nodes.len(),
        start.id
    );

    // Kahn over the reachable subgraph, stable by node-list position.
    let position: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut in_degree: HashMap<&str, usize> = reachable.iter().map(|id| (*id, 0)).collect();
    for edge in &default_edges {
        if reachable.contains(edge.from.as_str()) && reachable.contains(edge.to.as_str()) {
            *in_degree.entry(edge.to.as_str()).or_insert(0) += 1;
        }
    }

    let mut ready: Vec<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    ready.sort_by_key(|id| position[id]);

    let mut order = Vec::with_capacity(reachable.len());
    while let Some(id) = take_first(&mut ready, &position) {
        order.push(id.to_string());
        for edge in &default_edges {
            if edge.from == id && reachable.contains(edge.to.as_str()) {
                let degree = in_degree
                    .get_mut(edge.to.as_str())
                    .expect("reachable target has an in-degree entry");
                *degree -= 1;
                if *degree == 0 {
                    ready.push(edge.to.as_str());
                }
            }
        }
    }

    if order.len() != reachable.len() {
        let stuck = reachable
            .iter()
            .find(|id| !order.iter().any(|o| o == *id))
            .copied()
            .unwrap_or_default();
        return Err(DagError::CycleDetected(stuck.to_string()));
    }

    Ok(order)
}

fn take_first<'a>(ready: &mut Vec<&'a str>, position: &HashMap<&str, usize>) -> Option<&'a str> {
    if ready.is_empty() {
        return None;
    }
    let mut best = 0;
    for idx in 1..ready.len() {
        if position[ready[idx]] < position[ready[best]] {
            best = idx;
        }
    }
    Some(ready.swap_remove(best))
}

fn reach_from<'a>(start: &'a str, default_edges: &[&'a FlowEdge]) -> HashSet<&'a str> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        for edge in default_edges {
            if edge.from == id && !seen.contains(edge.to.as_str()) {
                stack.push(edge.to.as_str());
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: &str) -> FlowNode {
        FlowNode::new(id, "script", json!({}))
    }

    #[test]
    fn order_respects_every_default_edge() {
        let nodes = vec![node("a"), node("b"), node("c"), node("d")];
        let edges = vec![
            FlowEdge::new("a", "b"),
            FlowEdge::new("a", "c"),
            FlowEdge::new("b", "d"),
            FlowEdge::new("c", "d"),
        ];

        let order = topo_order(&nodes, &edges).unwrap();
        assert_eq!(order.len(), 4);
        for edge in &edges {
            let from = order.iter().position(|n| *n == edge.from).unwrap();
            let to = order.iter().position(|n| *n == edge.to).unwrap();
            assert!(from < to, "edge {} -> {} violated", edge.from, edge.to);
        }
    }

    #[test]
    fn order_is_deterministic_by_node_position() {
        let nodes = vec![node("a"), node("c"), node("b")];
        let edges = vec![FlowEdge::new("a", "c"), FlowEdge::new("a", "b")];

        let order = topo_order(&nodes, &edges).unwrap();
        // Both c and b become ready after a; node-list position decides.
        assert_eq!(order, vec!["a", "c", "b"]);
    }

    #[test]
    fn cycle_is_an_error() {
        let nodes = vec![node("a"), node("b")];
        let edges = vec![FlowEdge::new("a", "b"), FlowEdge::new("b", "a")];

        match topo_order(&nodes, &edges) {
            Err(DagError::CycleDetected(_)) => {}
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn branch_targets_excluded_from_linear_pass() {
        let nodes = vec![node("a"), node("b"), node("err")];
        let edges = vec![
            FlowEdge::new("a", "b"),
            FlowEdge::new("a", "err").labeled("onError"),
        ];

        let order = topo_order(&nodes, &edges).unwrap();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn labeled_cycle_does_not_block_compilation() {
        // The back-edge is a branch label; the default subgraph stays acyclic.
        let nodes = vec![node("a"), node("b")];
        let edges = vec![
            FlowEdge::new("a", "b"),
            FlowEdge::new("b", "a").labeled("case:again"),
        ];

        let order = topo_order(&nodes, &edges).unwrap();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn empty_graph_is_an_error() {
        assert!(matches!(topo_order(&[], &[]), Err(DagError::EmptyGraph)));
    }

    #[test]
    fn unknown_edge_endpoint_is_an_error() {
        let nodes = vec![node("a")];
        let edges = vec![FlowEdge::new("a", "ghost")];
        assert!(matches!(
            topo_order(&nodes, &edges),
            Err(DagError::UnknownNode(_))
        ));
    }
}
