use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use fennec_core::{FennecError, Result, Role, ToolCall};

use crate::profile::ProviderProfile;
use crate::provider::*;

/// Anthropic Claude messages API adapter — the cloud-general backend for
/// reasoning and tool use.
pub struct AnthropicAdapter {
    profile: ProviderProfile,
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicAdapter {
    pub fn new(profile: ProviderProfile, api_key: String, model: String) -> Self {
        Self {
            profile,
            client: Client::new(),
            api_key,
            base_url: "https://api.anthropic.com/v1".into(),
            model,
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn build_request_body(&self, request: &LlmRequest) -> serde_json::Value {
        let mut messages = Vec::new();
        for turn in &request.messages {
            match turn.role {
                Role::System => {
                    // No top-level system turns mid-conversation; fold into a
                    // user message so recall context still reaches the model.
                    messages.push(serde_json::json!({
                        "role": "user",
                        "content": turn.content,
                    }));
                }
                Role::User => {
                    messages.push(serde_json::json!({
                        "role": "user",
                        "content": turn.content,
                    }));
                }
                Role::Assistant => {
                    if turn.tool_calls.is_empty() {
                        messages.push(serde_json::json!({
                            "role": "assistant",
                            "content": turn.content,
                        }));
                    } else {
                        // Assistant turn with tool_use blocks
                        let mut content_blocks: Vec<serde_json::Value> = Vec::new();
                        if !turn.content.is_empty() {
                            content_blocks.push(serde_json::json!({
                                "type": "text",
                                "text": turn.content,
                            }));
                        }
                        for tc in &turn.tool_calls {
                            content_blocks.push(serde_json::json!({
                                "type": "tool_use",
                                "id": tc.id,
                                "name": tc.tool_name,
                                "input": tc.arguments,
                            }));
                        }
                        messages.push(serde_json::json!({
                            "role": "assistant",
                            "content": content_blocks,
                        }));
                    }
                }
                Role::Tool => {
                    // Tool results sent as user message with tool_result blocks
                    if let Some(ref call_id) = turn.tool_call_id {
                        messages.push(serde_json::json!({
                            "role": "user",
                            "content": [{
                                "type": "tool_result",
                                "tool_use_id": call_id,
                                "content": turn.content,
                                "is_error": turn.is_error,
                            }],
                        }));
                    } else {
                        messages.push(serde_json::json!({
                            "role": "user",
                            "content": turn.content,
                        }));
                    }
                }
            }
        }

        let mut body = serde_json::json!({
            "model": &self.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": messages,
        });

        if let Some(ref system) = request.system {
            body["system"] = serde_json::json!(system);
        }

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }

        body
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = self.build_request_body(request);
        debug!(model = %self.model, "sending Anthropic API request");

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2024-10-22")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| FennecError::Provider(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(FennecError::RateLimited {
                    retry_after_secs: 30,
                });
            }
            return Err(FennecError::Provider(format!("HTTP {status}: {text}")));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| FennecError::Provider(e.to_string()))?;

        let content = data["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| {
                        if b["type"] == "text" {
                            b["text"].as_str().map(|s| s.to_string())
                        } else {
                            None
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let tool_calls: Vec<ToolCall> = data["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| {
                        if b["type"] == "tool_use" {
                            Some(ToolCall {
                                id: b["id"].as_str().unwrap_or("").to_string(),
                                tool_name: b["name"].as_str().unwrap_or("").to_string(),
                                arguments: b["input"].clone(),
                            })
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let stop_reason = match data["stop_reason"].as_str() {
            Some("tool_use") => StopReason::ToolUse,
            Some("max_tokens") => StopReason::MaxTokens,
            Some("stop_sequence") => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        };

        let usage_data = &data["usage"];

        Ok(LlmResponse {
            content,
            tool_calls,
            usage: Usage {
                input_tokens: usage_data["input_tokens"].as_u64().unwrap_or(0) as u32,
                output_tokens: usage_data["output_tokens"].as_u64().unwrap_or(0) as u32,
            },
            stop_reason,
        })
    }

    async fn health_check(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(FennecError::Provider("ANTHROPIC_API_KEY not set".into()));
        }
        Ok(())
    }
}
