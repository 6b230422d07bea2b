pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{ErrorKind, NodeflowError, Result};
pub use event::{EventBus, FlowEvent};
pub use graph::{FlowEdge, FlowNode, Graph};
pub use types::*;
