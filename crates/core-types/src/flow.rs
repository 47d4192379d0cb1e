//! Flow definition: identity, variables, and the two execution shapes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::step::Step;
use crate::FlowId;

/// Edge label that marks the main path. An absent or empty label means the
/// same thing.
pub const DEFAULT_EDGE_LABEL: &str = "default";

/// A stored automation definition.
///
/// A flow is either linear (`steps`) or graph-shaped (`nodes` + `edges`);
/// graph mode takes precedence when `nodes` is non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: FlowId,
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub variables: Vec<VariableDecl>,

    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default)]
    pub nodes: Vec<FlowNode>,

    #[serde(default)]
    pub edges: Vec<FlowEdge>,

    #[serde(default)]
    pub subflows: HashMap<String, Subflow>,
}

fn default_version() -> u32 {
    1
}

impl Flow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: FlowId::new(),
            name: name.into(),
            description: String::new(),
            version: 1,
            variables: Vec::new(),
            steps: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            subflows: HashMap::new(),
        }
    }

    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_graph(mut self, nodes: Vec<FlowNode>, edges: Vec<FlowEdge>) -> Self {
        self.nodes = nodes;
        self.edges = edges;
        self
    }

    pub fn with_variable(mut self, decl: VariableDecl) -> Self {
        self.variables.push(decl);
        self
    }

    pub fn with_subflow(mut self, id: impl Into<String>, subflow: Subflow) -> Self {
        self.subflows.insert(id.into(), subflow);
        self
    }

    /// Graph mode wins when nodes are present.
    pub fn is_graph(&self) -> bool {
        !self.nodes.is_empty()
    }
}

/// Declared flow variable: seeded from `default`, overridable by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDecl {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default)]
    pub required: bool,

    /// Sensitive variables are excluded from run outputs.
    #[serde(default)]
    pub sensitive: bool,
}

impl VariableDecl {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            default: None,
            required: false,
            sensitive: false,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// Graph node: a type tag plus free-form config, mapped to a [`Step`] at
/// execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    pub id: String,

    #[serde(rename = "type")]
    pub node_type: String,

    #[serde(default)]
    pub config: Value,
}

impl FlowNode {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, config: Value) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            config,
        }
    }

    /// Structural start marker; carries no executable config.
    pub fn is_start(&self) -> bool {
        self.node_type == "start"
    }
}

/// Directed edge. `label` of `None`, `""`, or `"default"` is the main path;
/// `case:<id>`, `true`/`false`, and `onError` mark branches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEdge {
    pub from: String,
    pub to: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl FlowEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: None,
        }
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn is_default(&self) -> bool {
        match self.label.as_deref() {
            None | Some("") => true,
            Some(label) => label == DEFAULT_EDGE_LABEL,
        }
    }
}

/// A named, embedded node/edge graph invoked by loop and branch directives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subflow {
    #[serde(default)]
    pub nodes: Vec<FlowNode>,

    #[serde(default)]
    pub edges: Vec<FlowEdge>,
}

impl Subflow {
    pub fn new(nodes: Vec<FlowNode>, edges: Vec<FlowEdge>) -> Self {
        Self { nodes, edges }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_mode_takes_precedence() {
        let mut flow = Flow::new("mixed");
        flow.steps = vec![Step::new(
            "s1",
            crate::step::StepKind::Navigate {
                url: "https://example.com".into(),
            },
        )];
        assert!(!flow.is_graph());

        flow.nodes = vec![FlowNode::new("n1", "navigate", serde_json::json!({}))];
        assert!(flow.is_graph());
    }

    #[test]
    fn default_edge_detection() {
        assert!(FlowEdge::new("a", "b").is_default());
        assert!(FlowEdge::new("a", "b").labeled("").is_default());
        assert!(FlowEdge::new("a", "b").labeled("default").is_default());
        assert!(!FlowEdge::new("a", "b").labeled("onError").is_default());
        assert!(!FlowEdge::new("a", "b").labeled("case:x").is_default());
    }
}
