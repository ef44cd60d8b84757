use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::types::{TaskId, TaskStatus};

/// Step events emitted while a task runs.
///
/// This is the vocabulary chat transports and the dashboard's live view
/// consume: every event is keyed by the task id it belongs to, and a task's
/// stream always ends with `Done`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepEvent {
    /// The agent is running a reasoning step.
    Thinking { task_id: TaskId },
    /// The agent requested a tool invocation.
    ToolCall {
        task_id: TaskId,
        tool: String,
        call_id: String,
    },
    /// A tool invocation returned.
    ToolResult {
        task_id: TaskId,
        call_id: String,
        is_error: bool,
    },
    /// The agent produced its final answer.
    Response { task_id: TaskId, content: String },
    /// A task-level error occurred.
    Error { task_id: TaskId, message: String },
    /// The task reached a terminal status. Always the last event for a task.
    Done { task_id: TaskId, status: TaskStatus },
}

impl StepEvent {
    /// The task this event belongs to.
    pub fn task_id(&self) -> TaskId {
        match self {
            StepEvent::Thinking { task_id }
            | StepEvent::ToolCall { task_id, .. }
            | StepEvent::ToolResult { task_id, .. }
            | StepEvent::Response { task_id, .. }
            | StepEvent::Error { task_id, .. }
            | StepEvent::Done { task_id, .. } => *task_id,
        }
    }
}

/// A broadcast-based event bus for step events.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<StepEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: StepEvent) {
        // Ignore send errors (no subscribers).
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StepEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}
