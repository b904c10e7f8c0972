//! Domain event system for observing executions without coupling to them.

use crate::execution::ExecutionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// An execution record was created in RUNNING
    ExecutionStarted {
        execution_id: String,
        agent_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed inside a run
    ToolExecuted {
        execution_id: Option<String>,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The language model answered one step
    ResponseGenerated {
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// An execution reached a terminal state
    ExecutionFinished {
        execution_id: String,
        status: ExecutionStatus,
        duration_ms: i64,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
