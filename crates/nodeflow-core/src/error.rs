use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeflowError {
    // Graph errors
    #[error("Cycle detected in flow graph; unscheduled nodes: {}", .remaining.join(", "))]
    CycleDetected { remaining: Vec<String> },

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    // Registry errors
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    // Input errors
    #[error("Required input '{input}' is missing in node {node}")]
    MissingRequiredInput { node: String, input: String },

    #[error("Type mismatch on edge {edge}: [{}] -> {expected}", .provided.join(", "))]
    TypeMismatch {
        edge: String,
        provided: Vec<String>,
        expected: String,
    },

    // Node errors
    #[error("Node execution failed: {node}: {message}")]
    NodeExecution { node: String, message: String },

    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serializable classification of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CycleDetected,
    InvalidGraph,
    UnknownNodeType,
    MissingRequiredInput,
    TypeMismatch,
    NodeExecutionFailure,
}

impl NodeflowError {
    /// Map this error onto the run-level taxonomy.
    ///
    /// Anything raised from inside a node that is not already one of the
    /// graph-level kinds counts as a node execution failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CycleDetected { .. } => ErrorKind::CycleDetected,
            Self::InvalidGraph(_) => ErrorKind::InvalidGraph,
            Self::UnknownNodeType(_) => ErrorKind::UnknownNodeType,
            Self::MissingRequiredInput { .. } => ErrorKind::MissingRequiredInput,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            _ => ErrorKind::NodeExecutionFailure,
        }
    }

    /// Wrap an arbitrary node failure with the id of the node that raised it.
    pub fn node(node: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::NodeExecution {
            node: node.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NodeflowError>;
