use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task.
pub type TaskId = Uuid;

/// What a provider (or a request) is capable of / requires.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Reasoning,
    ToolUse,
    Summarization,
    Embedding,
    Search,
    Social,
}

/// Coarse latency expectation for a provider. Ordering is fastest-first so
/// the router can use it directly as a sort key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LatencyClass {
    Fast,
    Standard,
    Slow,
}

/// Where a task came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOrigin {
    /// A user message arriving over a chat transport.
    Chat,
    /// A scheduled trigger firing.
    Scheduler,
    /// Submitted through the dashboard interface.
    Dashboard,
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// One unit of agent work, from either a user message or a scheduled trigger.
///
/// Owned by the task queue until claimed by a worker; a claimed task is owned
/// by exactly one agent loop instance until it reaches a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub origin: TaskOrigin,
    /// User text or trigger description.
    pub payload: String,
    /// Higher priority tasks are dequeued first.
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    pub status: TaskStatus,
    /// Correlation id for reply routing back to the originating transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Name of the trigger that produced this task (scheduler-born tasks only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
}

impl Task {
    pub fn new(origin: TaskOrigin, payload: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin,
            payload: payload.into(),
            priority: 5,
            created_at: Utc::now(),
            status: TaskStatus::Queued,
            correlation_id: None,
            trigger: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }
}
