use crate::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Events emitted during workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    WorkflowStarted {
        execution_id: ExecutionId,
        workflow: String,
        execution_order: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    WorkflowCompleted {
        execution_id: ExecutionId,
        failed_nodes: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        execution_id: ExecutionId,
        node_id: String,
        node_type: String,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        execution_id: ExecutionId,
        node_id: String,
        outputs: HashMap<String, Value>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        execution_id: ExecutionId,
        node_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    NodeEvent {
        execution_id: ExecutionId,
        node_id: String,
        event: NodeEvent,
        timestamp: DateTime<Utc>,
    },
}

/// Events raised from inside a running node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum NodeEvent {
    Info { message: String },
    Warning { message: String },
}

/// Event emitter handed to a node for real-time updates
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    node_id: String,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(
        execution_id: ExecutionId,
        node_id: impl Into<String>,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            execution_id,
            node_id: node_id.into(),
            sender,
        }
    }

    /// Emitter with no subscribers; every event is dropped.
    pub fn detached(node_id: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(1);
        Self::new(Uuid::nil(), node_id, sender)
    }

    pub fn emit(&self, event: NodeEvent) {
        let _ = self.sender.send(ExecutionEvent::NodeEvent {
            execution_id: self.execution_id,
            node_id: self.node_id.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Info {
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Warning {
            message: message.into(),
        });
    }
}

/// Broadcast bus shared by a runtime
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, execution_id: ExecutionId, node_id: &str) -> EventEmitter {
        EventEmitter::new(execution_id, node_id, self.sender.clone())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitter_events_reach_subscribers() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let execution_id = Uuid::new_v4();

        bus.create_emitter(execution_id, "greet").info("hello");

        match rx.recv().await.unwrap() {
            ExecutionEvent::NodeEvent { node_id, event: NodeEvent::Info { message }, .. } => {
                assert_eq!(node_id, "greet");
                assert_eq!(message, "hello");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn zero_capacity_bus_still_delivers() {
        let bus = EventBus::new(0);
        let mut rx = bus.subscribe();
        bus.create_emitter(Uuid::nil(), "n").warn("kept");
        assert!(matches!(
            rx.recv().await.unwrap(),
            ExecutionEvent::NodeEvent { event: NodeEvent::Warning { .. }, .. }
        ));
    }

    #[test]
    fn detached_emitter_never_fails() {
        EventEmitter::detached("n").warn("nobody is listening");
    }
}
