use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::graph::Graph;
use nodeflow_core::traits::Node;
use nodeflow_core::types::NodeKind;
use nodeflow_nodes::NodeRegistry;

use crate::scheduler;

/// One scheduled node with its instantiated implementation.
#[derive(Clone)]
pub struct PlanStep {
    pub node_id: String,
    pub node_type: String,
    pub kind: NodeKind,
    pub node: Arc<dyn Node>,
}

impl std::fmt::Debug for PlanStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanStep")
            .field("node_id", &self.node_id)
            .field("node_type", &self.node_type)
            .field("kind", &self.kind)
            .finish()
    }
}

/// A graph compiled into an ordered list of ready-to-run nodes.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    /// Schedule `graph` and instantiate every node through `registry`.
    pub fn compile(graph: &Graph, registry: &NodeRegistry) -> Result<Self> {
        if graph.nodes.is_empty() {
            return Err(NodeflowError::InvalidGraph(
                "Workflow must contain at least one node".into(),
            ));
        }

        let order = scheduler::schedule(graph)?;
        let mut steps = Vec::with_capacity(order.len());
        for node_id in order {
            let node_type = graph
                .node(&node_id)
                .map(|n| n.node_type.clone())
                .ok_or_else(|| NodeflowError::InvalidGraph(format!("Node {} vanished", node_id)))?;
            let node = registry.create(&node_type)?;
            steps.push(PlanStep {
                kind: node.descriptor().kind,
                node_id,
                node_type,
                node,
            });
        }

        debug!(steps = steps.len(), workflow = %graph.name, "Compiled execution plan");
        Ok(Self { steps })
    }

    pub fn order(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.node_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Compiled plans keyed by workflow id or correlation id.
///
/// Entries live until explicitly removed.
#[derive(Default)]
pub struct PlanCache {
    plans: RwLock<HashMap<String, Arc<ExecutionPlan>>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<Arc<ExecutionPlan>> {
        self.plans.read().await.get(key).cloned()
    }

    /// Store a fully built plan; a concurrent insert for the same key is
    /// simply replaced.
    pub async fn insert(&self, key: impl Into<String>, plan: Arc<ExecutionPlan>) {
        self.plans.write().await.insert(key.into(), plan);
    }

    pub async fn invalidate(&self, key: &str) -> bool {
        self.plans.write().await.remove(key).is_some()
    }

    pub async fn clear(&self) {
        self.plans.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.plans.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.plans.read().await.is_empty()
    }
}
