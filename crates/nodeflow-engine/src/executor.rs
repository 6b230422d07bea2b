use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use nodeflow_core::error::{ErrorKind, NodeflowError, Result};
use nodeflow_core::event::{EventBus, FlowEvent};
use nodeflow_core::graph::Graph;
use nodeflow_core::types::*;
use nodeflow_nodes::NodeRegistry;

use crate::plan::{ExecutionPlan, PlanCache, PlanStep};
use crate::resolver::{resolve_inputs, ResolvedInputs};
use crate::session::SessionManager;
use crate::validator::{validate, ValidationReport};

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Scheduled,
    /// Executing the step at this index.
    Running(usize),
    Completed,
    Failed,
}

impl ExecutionState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        match (self, next) {
            (Idle, Scheduled) | (Idle, Failed) => true,
            (Scheduled, Running(0)) | (Scheduled, Failed) => true,
            (Running(i), Running(j)) => j == i + 1,
            (Running(_), Completed) | (Running(_), Failed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Running(i) => write!(f, "running({})", i),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why a run failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// The node that was executing, if the failure happened inside a step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

/// Final report of [`FlowExecutor::run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed {
        /// Value of the last executed node.
        result: serde_json::Value,
        execution_order: Vec<String>,
        correlation_id: SessionId,
        elapsed_ms: u64,
        plan_cached: bool,
    },
    Failed {
        error: RunFailure,
        /// Nodes that completed before the failure.
        execution_order: Vec<String>,
        correlation_id: SessionId,
        elapsed_ms: u64,
    },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Completed { result, .. } => Some(result),
            Self::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&RunFailure> {
        match self {
            Self::Completed { .. } => None,
            Self::Failed { error, .. } => Some(error),
        }
    }

    pub fn execution_order(&self) -> &[String] {
        match self {
            Self::Completed { execution_order, .. } | Self::Failed { execution_order, .. } => {
                execution_order
            }
        }
    }

    pub fn correlation_id(&self) -> &SessionId {
        match self {
            Self::Completed { correlation_id, .. } | Self::Failed { correlation_id, .. } => {
                correlation_id
            }
        }
    }
}

/// Per-run bookkeeping owned by a single `run` call.
struct RunTrace {
    correlation_id: SessionId,
    state: ExecutionState,
    order: Vec<String>,
    current: Option<String>,
}

impl RunTrace {
    fn new(correlation_id: SessionId) -> Self {
        Self {
            correlation_id,
            state: ExecutionState::Idle,
            order: Vec::new(),
            current: None,
        }
    }

    fn advance(&mut self, next: ExecutionState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(
            correlation_id = %self.correlation_id,
            from = %self.state,
            to = %next,
            "Run state transition"
        );
        self.state = next;
    }
}

/// Runs flow graphs against a node registry.
///
/// One executor may serve many concurrent runs; steps within a run execute
/// strictly one after another.
pub struct FlowExecutor {
    registry: Arc<NodeRegistry>,
    plans: PlanCache,
    plan_cache: bool,
    events: Option<Arc<EventBus>>,
    sessions: Option<Arc<SessionManager>>,
}

impl FlowExecutor {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            plans: PlanCache::new(),
            plan_cache: true,
            events: None,
            sessions: None,
        }
    }

    /// Enable or disable reuse of compiled plans.
    pub fn with_plan_cache(mut self, enabled: bool) -> Self {
        self.plan_cache = enabled;
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Record every completed run in the session named by its correlation id.
    pub fn with_sessions(mut self, sessions: Arc<SessionManager>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Drop the cached plan for `key`.
    pub async fn invalidate(&self, key: &str) -> bool {
        self.plans.invalidate(key).await
    }

    pub async fn clear_plans(&self) {
        self.plans.clear().await;
    }

    pub async fn cached_plans(&self) -> usize {
        self.plans.len().await
    }

    /// Statically check `graph` without running it.
    pub fn validate(&self, graph: &Graph) -> ValidationReport {
        validate(graph, &self.registry)
    }

    /// Execute `graph` end to end for `input`.
    ///
    /// Never returns an error: every failure is reported as
    /// [`RunOutcome::Failed`] together with the nodes that completed.
    pub async fn run(
        &self,
        graph: &Graph,
        input: &str,
        correlation_id: Option<SessionId>,
    ) -> RunOutcome {
        let start = Instant::now();
        let cache_key = graph
            .id
            .clone()
            .or_else(|| correlation_id.as_ref().map(|c| c.0.clone()));
        let mut trace = RunTrace::new(correlation_id.unwrap_or_default());

        info!(
            correlation_id = %trace.correlation_id,
            workflow = %graph.name,
            nodes = graph.nodes.len(),
            "Starting flow run"
        );
        self.publish(FlowEvent::RunStarted {
            correlation_id: trace.correlation_id.clone(),
            workflow: graph.id.clone(),
            node_count: graph.nodes.len(),
        });

        let outcome = self
            .execute(graph, input, cache_key.as_deref(), &mut trace)
            .await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok((result, plan_cached)) => {
                trace.advance(ExecutionState::Completed);
                info!(
                    correlation_id = %trace.correlation_id,
                    steps = trace.order.len(),
                    elapsed_ms,
                    plan_cached,
                    "Flow run completed"
                );

                if let Some(sessions) = &self.sessions {
                    sessions.record_exchange(
                        &trace.correlation_id,
                        input,
                        text_content(&result),
                        graph.id.as_deref(),
                    );
                }
                self.publish(FlowEvent::RunCompleted {
                    correlation_id: trace.correlation_id.clone(),
                    elapsed_ms,
                    result: result.clone(),
                });

                RunOutcome::Completed {
                    result,
                    execution_order: trace.order,
                    correlation_id: trace.correlation_id,
                    elapsed_ms,
                    plan_cached,
                }
            }
            Err(e) => {
                trace.advance(ExecutionState::Failed);
                let failure = RunFailure {
                    kind: e.kind(),
                    message: e.to_string(),
                    node_id: trace.current.take(),
                };
                error!(
                    correlation_id = %trace.correlation_id,
                    kind = ?failure.kind,
                    node_id = ?failure.node_id,
                    error = %failure.message,
                    "Flow run failed"
                );
                self.publish(FlowEvent::RunFailed {
                    correlation_id: trace.correlation_id.clone(),
                    kind: failure.kind,
                    message: failure.message.clone(),
                });

                RunOutcome::Failed {
                    error: failure,
                    execution_order: trace.order,
                    correlation_id: trace.correlation_id,
                    elapsed_ms,
                }
            }
        }
    }

    /// Fetch or build the plan for this run.
    async fn plan(&self, graph: &Graph, key: Option<&str>) -> Result<(Arc<ExecutionPlan>, bool)> {
        let key = key.filter(|_| self.plan_cache);
        if let Some(key) = key {
            if let Some(plan) = self.plans.get(key).await {
                debug!(key, "Reusing cached plan");
                return Ok((plan, true));
            }
        }

        let plan = Arc::new(ExecutionPlan::compile(graph, &self.registry)?);
        if let Some(key) = key {
            self.plans.insert(key, plan.clone()).await;
        }
        Ok((plan, false))
    }

    async fn execute(
        &self,
        graph: &Graph,
        input: &str,
        cache_key: Option<&str>,
        trace: &mut RunTrace,
    ) -> Result<(serde_json::Value, bool)> {
        let (plan, plan_cached) = self.plan(graph, cache_key).await?;
        trace.advance(ExecutionState::Scheduled);

        let mut results: HashMap<String, serde_json::Value> = HashMap::with_capacity(plan.len());
        let mut last: Option<String> = None;

        for (i, step) in plan.steps.iter().enumerate() {
            trace.advance(ExecutionState::Running(i));
            trace.current = Some(step.node_id.clone());
            let node_start = Instant::now();

            let node = graph.node(&step.node_id).ok_or_else(|| {
                NodeflowError::InvalidGraph(format!(
                    "Node {} is in the cached plan but not in the graph",
                    step.node_id
                ))
            })?;
            if node.node_type != step.node_type {
                warn!(
                    node_id = %step.node_id,
                    planned = %step.node_type,
                    actual = %node.node_type,
                    "Graph differs from cached plan"
                );
            }

            debug!(node_id = %step.node_id, node_type = %step.node_type, kind = %step.kind, "Executing node");
            self.publish(FlowEvent::NodeStarted {
                correlation_id: trace.correlation_id.clone(),
                node_id: step.node_id.clone(),
                node_type: step.node_type.clone(),
                kind: step.kind,
                step: i,
            });

            let resolved = resolve_inputs(node, graph, &results);
            step.node.validate_inputs(&step.node_id, &resolved.values)?;
            let call = build_call(step, resolved)?;
            let ctx = NodeContext {
                node_id: step.node_id.clone(),
                input_text: input.to_string(),
                correlation_id: trace.correlation_id.clone(),
            };

            let value = step
                .node
                .execute(call, ctx)
                .await
                .map_err(|e| node_failure(&step.node_id, e))?;

            let elapsed_ms = node_start.elapsed().as_millis() as u64;
            debug!(node_id = %step.node_id, elapsed_ms, "Node execution complete");

            if results.insert(step.node_id.clone(), value).is_some() {
                return Err(NodeflowError::InvalidGraph(format!(
                    "Node {} produced a second result",
                    step.node_id
                )));
            }
            trace.order.push(step.node_id.clone());
            trace.current = None;
            last = Some(step.node_id.clone());

            self.publish(FlowEvent::NodeCompleted {
                correlation_id: trace.correlation_id.clone(),
                node_id: step.node_id.clone(),
                elapsed_ms,
            });
        }

        let result = last
            .and_then(|id| results.remove(&id))
            .unwrap_or(serde_json::Value::Null);
        Ok((result, plan_cached))
    }

    fn publish(&self, event: FlowEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

/// Shape the resolved inputs into the call the node's kind expects.
fn build_call(step: &PlanStep, resolved: ResolvedInputs) -> Result<NodeCall> {
    match step.kind {
        NodeKind::Provider => {
            if !resolved.connected.is_empty() {
                warn!(
                    node_id = %step.node_id,
                    inputs = ?resolved.connected,
                    "Provider node has incoming connections; treating them as static inputs"
                );
            }
            Ok(NodeCall::Provider {
                params: resolved.values,
            })
        }
        NodeKind::Processor => {
            let (params, connected) = resolved.split();
            Ok(NodeCall::Processor { params, connected })
        }
        NodeKind::Terminator => {
            let (params, connected) = resolved.split();
            let mut upstream = connected.into_iter();
            match (upstream.next(), upstream.next()) {
                (Some((_, value)), None) => Ok(NodeCall::Terminator { params, upstream: value }),
                (None, _) => Err(NodeflowError::MissingRequiredInput {
                    node: step.node_id.clone(),
                    input: step
                        .node
                        .descriptor()
                        .inputs
                        .iter()
                        .find(|p| p.is_connection)
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| "input".to_string()),
                }),
                (Some(_), Some(_)) => Err(NodeflowError::InvalidGraph(format!(
                    "Terminator node {} expects exactly one upstream value",
                    step.node_id
                ))),
            }
        }
    }
}

/// Graph-level errors raised inside a node keep their kind; anything else
/// becomes a node execution failure naming the node.
fn node_failure(node_id: &str, e: NodeflowError) -> NodeflowError {
    match e {
        NodeflowError::NodeExecution { .. } => e,
        e if e.kind() != ErrorKind::NodeExecutionFailure => e,
        e => NodeflowError::node(node_id, e),
    }
}
