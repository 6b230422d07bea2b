//! Workflow graph execution engine.
//!
//! A [`Graph`](nodeflow_core::Graph) is compiled into an [`ExecutionPlan`]
//! (topological order plus one node instance per step), then run step by
//! step: each node's inputs are resolved from its static values and the
//! results of upstream nodes, validated, and handed to the node as a
//! [`NodeCall`](nodeflow_core::NodeCall) shaped by its kind. The
//! [`validator`] performs the same structural checks without running
//! anything.

pub mod executor;
pub mod plan;
pub mod resolver;
pub mod scheduler;
pub mod session;
pub mod validator;

pub use executor::{ExecutionState, FlowExecutor, RunFailure, RunOutcome};
pub use plan::{ExecutionPlan, PlanCache, PlanStep};
pub use resolver::{resolve_inputs, ResolvedInputs};
pub use scheduler::schedule;
pub use session::{ChatTurn, Session, SessionManager};
pub use validator::{validate, ValidationReport};
