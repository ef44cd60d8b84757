use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Description of a capability plugin the agent can invoke.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Unique name, e.g. "web_search", "delegate".
    pub name: String,
    /// Human-readable description for the LLM.
    pub description: String,
    /// JSON Schema of the arguments object.
    pub input_schema: Value,
    /// JSON Schema of the result payload.
    #[serde(default)]
    pub output_schema: Value,
}

/// A request from the LLM to call a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// The result of executing a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// Trait implemented by each tool collaborator.
///
/// The registry owns validation and error wrapping; executors only see
/// arguments that already passed their declared input schema.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// The tool's definition (name, description, schemas).
    fn definition(&self) -> Tool;

    /// Execute with validated arguments and return the result text.
    async fn execute(&self, arguments: &Value) -> crate::Result<String>;
}
