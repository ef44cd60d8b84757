//! Mock provider for deterministic testing.
//!
//! Returns pre-configured responses without making any HTTP calls.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use fennec_core::{Capability, FennecError, Result, ToolCall};

use crate::embedding::EmbeddingProvider;
use crate::profile::ProviderProfile;
use crate::provider::*;

/// A mock LLM backend that returns queued responses in order.
///
/// # Example
/// ```
/// use fennec_llm::mock::MockProvider;
/// use fennec_core::Capability;
/// let provider = MockProvider::new("test", [Capability::Reasoning])
///     .with_response("Hello, world!");
/// ```
pub struct MockProvider {
    profile: ProviderProfile,
    responses: Arc<Mutex<Vec<MockResponse>>>,
    /// Track all requests received (for assertions in tests).
    pub requests: Arc<Mutex<Vec<LlmRequest>>>,
}

/// A pre-configured response from the mock provider.
#[derive(Clone)]
pub struct MockResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
    pub usage: Usage,
    /// If set, the provider returns this error instead.
    pub error: Option<String>,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            content: String::new(),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: Usage {
                input_tokens: 100,
                output_tokens: 50,
            },
            error: None,
        }
    }
}

impl MockResponse {
    /// Create a text response.
    pub fn text(text: &str) -> Self {
        Self {
            content: text.to_string(),
            ..Default::default()
        }
    }

    /// Create an error response.
    pub fn error(msg: &str) -> Self {
        Self {
            error: Some(msg.to_string()),
            ..Default::default()
        }
    }

    /// Create a tool-call response.
    pub fn tool_call(name: &str, args: serde_json::Value) -> Self {
        Self {
            tool_calls: vec![ToolCall {
                id: format!("call_{}", uuid::Uuid::new_v4()),
                tool_name: name.to_string(),
                arguments: args,
            }],
            stop_reason: StopReason::ToolUse,
            ..Default::default()
        }
    }
}

impl MockProvider {
    pub fn new(name: impl Into<String>, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            profile: ProviderProfile::new(name, capabilities),
            responses: Arc::new(Mutex::new(vec![])),
            requests: Arc::new(Mutex::new(vec![])),
        }
    }

    pub fn with_cost_weight(mut self, weight: u32) -> Self {
        self.profile.cost_weight = weight;
        self
    }

    pub fn with_latency_class(mut self, class: fennec_core::LatencyClass) -> Self {
        self.profile.latency_class = class;
        self
    }

    /// Queue a simple text response.
    pub fn with_response(self, text: &str) -> Self {
        self.responses.lock().unwrap().push(MockResponse::text(text));
        self
    }

    /// Queue a tool call response.
    pub fn with_tool_call(self, name: &str, args: serde_json::Value) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push(MockResponse::tool_call(name, args));
        self
    }

    /// Queue an error response.
    pub fn with_error(self, error: &str) -> Self {
        self.responses.lock().unwrap().push(MockResponse::error(error));
        self
    }

    /// Queue a fully custom response.
    pub fn with_mock_response(self, resp: MockResponse) -> Self {
        self.responses.lock().unwrap().push(resp);
        self
    }

    /// Queue a response directly (for mutable access patterns).
    pub fn queue_response(&mut self, resp: MockResponse) {
        self.responses.lock().unwrap().push(resp);
    }

    /// Get all requests that were made to this provider.
    pub fn recorded_requests(&self) -> Arc<Mutex<Vec<LlmRequest>>> {
        Arc::clone(&self.requests)
    }

    /// Pop the next queued response, or fall back to a marker text.
    fn next_response(&self) -> MockResponse {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            MockResponse {
                content: "(mock: no more queued responses)".to_string(),
                ..Default::default()
            }
        } else {
            responses.remove(0)
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let mock = self.next_response();

        if let Some(error) = mock.error {
            return Err(FennecError::Provider(error));
        }

        Ok(LlmResponse {
            content: mock.content,
            tool_calls: mock.tool_calls,
            usage: mock.usage,
            stop_reason: mock.stop_reason,
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Deterministic embedding provider for tests: hashes words into a fixed
/// number of buckets, so identical text always embeds identically.
pub struct MockEmbedding {
    dims: usize,
}

impl MockEmbedding {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedding {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vec = vec![0.0f32; self.dims];
                for word in text.split_whitespace() {
                    let mut h: usize = 5381;
                    for b in word.bytes() {
                        h = h.wrapping_mul(33).wrapping_add(b as usize);
                    }
                    vec[h % self.dims] += 1.0;
                }
                vec
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "mock"
    }
}
