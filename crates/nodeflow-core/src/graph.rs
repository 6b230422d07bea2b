use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NodeflowError, Result};
use crate::types::ValueMap;

/// Canvas coordinates. Display-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default)]
    pub inputs: ValueMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A node placed in a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    /// Registry key of the node type.
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub data: NodeData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl FlowNode {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data: NodeData::default(),
            position: None,
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.inputs.insert(name.into(), value);
        self
    }

    /// Values typed in by the user, before any edge is applied.
    pub fn static_inputs(&self) -> &ValueMap {
        &self.data.inputs
    }
}

/// A data dependency: `source`'s output feeds `target`'s input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(alias = "sourceHandle")]
    pub source_output: String,
    #[serde(alias = "targetHandle")]
    pub target_input: String,
}

impl FlowEdge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        source_output: impl Into<String>,
        target: impl Into<String>,
        target_input: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_output: source_output.into(),
            target_input: target_input.into(),
        }
    }
}

/// A complete workflow description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default = "default_graph_name")]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub edges: Vec<FlowEdge>,
}

fn default_graph_name() -> String {
    "Unnamed Workflow".into()
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            nodes: vec![],
            edges: vec![],
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_node(mut self, node: FlowNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_edge(mut self, edge: FlowEdge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            NodeflowError::InvalidGraph(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Edges whose target is `id`, in declaration order.
    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a FlowEdge> + 'a {
        self.edges.iter().filter(move |e| e.target == id)
    }

    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a FlowEdge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }
}
