use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fennec_core::{Capability, ConversationTurn, Result, Tool, ToolCall};

use crate::profile::ProviderProfile;

/// A request routed to an LLM backend.
///
/// Requests are classified by required capability tags, not by model name —
/// each adapter knows which model its profile is configured for.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Capability tags the serving provider must carry.
    pub required_capabilities: Vec<Capability>,
    /// Optional explicit provider preference. An eligible hinted provider is
    /// chosen ahead of the cost ordering; an ineligible hint is ignored.
    pub provider_hint: Option<String>,
    /// Conversation history, oldest first.
    pub messages: Vec<ConversationTurn>,
    /// Available tools.
    pub tools: Vec<Tool>,
    /// System prompt (separate from messages for providers that support it).
    pub system: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Temperature.
    pub temperature: f32,
}

impl LlmRequest {
    pub fn new(required: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            required_capabilities: required.into_iter().collect(),
            provider_hint: None,
            messages: vec![],
            tools: vec![],
            system: None,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// A complete response from an LLM backend.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The model's text output.
    pub content: String,
    /// Tool calls the model requested, empty for a final answer.
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub stop_reason: StopReason,
}

impl LlmResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    ContentFilter,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Uniform request/response contract implemented by each LLM backend.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// This backend's static profile (name, capabilities, cost, latency).
    fn profile(&self) -> &ProviderProfile;

    /// Send a request and wait for the complete response.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Check if this backend is reachable.
    async fn health_check(&self) -> Result<()>;
}
