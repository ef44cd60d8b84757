use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::ToolCall;
use crate::types::TaskId;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One immutable entry in a task's dialogue history.
///
/// Turns are append-only: once committed to the memory store they are never
/// mutated. Assistant turns carry the tool calls the model requested; tool
/// turns carry the id of the call they answer so providers can replay the
/// exchange in their wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub task_id: TaskId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Tool calls requested by the assistant in this turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For tool turns: which call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For tool turns: whether the invocation failed.
    #[serde(default)]
    pub is_error: bool,
}

impl ConversationTurn {
    pub fn new(task_id: TaskId, role: Role, content: impl Into<String>) -> Self {
        Self {
            task_id,
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: vec![],
            tool_call_id: None,
            is_error: false,
        }
    }

    /// An assistant turn that requested tool calls.
    pub fn assistant_with_calls(
        task_id: TaskId,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            tool_calls,
            ..Self::new(task_id, Role::Assistant, content)
        }
    }

    /// A tool result turn answering `tool_call_id`.
    pub fn tool_result(
        task_id: TaskId,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            is_error,
            ..Self::new(task_id, Role::Tool, content)
        }
    }
}
