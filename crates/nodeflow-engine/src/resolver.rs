use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use nodeflow_core::graph::{FlowNode, Graph};
use nodeflow_core::types::ValueMap;

/// A node's inputs after applying its incoming edges.
#[derive(Debug, Clone, Default)]
pub struct ResolvedInputs {
    /// Static values overlaid with connected results.
    pub values: ValueMap,
    /// Names whose value came from an upstream node.
    pub connected: BTreeSet<String>,
}

impl ResolvedInputs {
    /// Split into `(static params, connected values)`.
    pub fn split(self) -> (ValueMap, ValueMap) {
        let ResolvedInputs { values, connected } = self;
        values
            .into_iter()
            .partition(|(name, _)| !connected.contains(name))
    }
}

/// Merge `node`'s static inputs with the results of its upstream nodes.
///
/// Every edge targeting the node writes the source's result under the
/// edge's target input, replacing a static value of the same name. Edges
/// whose source has not produced a result are skipped. When two edges feed
/// the same input the later one wins.
pub fn resolve_inputs(
    node: &FlowNode,
    graph: &Graph,
    results: &HashMap<String, serde_json::Value>,
) -> ResolvedInputs {
    let mut resolved = ResolvedInputs {
        values: node.static_inputs().clone(),
        connected: BTreeSet::new(),
    };

    for edge in graph.incoming(&node.id) {
        match results.get(&edge.source) {
            Some(value) => {
                resolved
                    .values
                    .insert(edge.target_input.clone(), value.clone());
                resolved.connected.insert(edge.target_input.clone());
            }
            None => trace!(edge = %edge.id, source = %edge.source, "No upstream result yet"),
        }
    }

    resolved
}
