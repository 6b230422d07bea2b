use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::types::{NodeKind, SessionId};

/// Progress notifications emitted while a graph runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    RunStarted {
        correlation_id: SessionId,
        workflow: Option<String>,
        node_count: usize,
    },
    NodeStarted {
        correlation_id: SessionId,
        node_id: String,
        node_type: String,
        kind: NodeKind,
        step: usize,
    },
    NodeCompleted {
        correlation_id: SessionId,
        node_id: String,
        elapsed_ms: u64,
    },
    RunCompleted {
        correlation_id: SessionId,
        elapsed_ms: u64,
        result: serde_json::Value,
    },
    RunFailed {
        correlation_id: SessionId,
        kind: ErrorKind,
        message: String,
    },
}

impl FlowEvent {
    pub fn correlation_id(&self) -> &SessionId {
        match self {
            Self::RunStarted { correlation_id, .. }
            | Self::NodeStarted { correlation_id, .. }
            | Self::NodeCompleted { correlation_id, .. }
            | Self::RunCompleted { correlation_id, .. }
            | Self::RunFailed { correlation_id, .. } => correlation_id,
        }
    }

    /// Whether no further events follow for this run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunCompleted { .. } | Self::RunFailed { .. })
    }
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<FlowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: FlowEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<FlowEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let id = SessionId::from_str("s1");

        bus.publish(FlowEvent::NodeCompleted {
            correlation_id: id.clone(),
            node_id: "prompt_0".into(),
            elapsed_ms: 3,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.correlation_id(), &id);
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(FlowEvent::RunFailed {
            correlation_id: SessionId::new(),
            kind: ErrorKind::CycleDetected,
            message: "cycle".into(),
        });
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = FlowEvent::RunFailed {
            correlation_id: SessionId::from_str("s1"),
            kind: ErrorKind::UnknownNodeType,
            message: "Unknown node type: foo".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "run_failed");
        assert_eq!(json["kind"], "unknown_node_type");
        assert_eq!(json["correlation_id"], "s1");
    }
}
