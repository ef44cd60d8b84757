use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use fennec_core::{FennecError, Result, Role, ToolCall};

use crate::profile::ProviderProfile;
use crate::provider::*;

/// Adapter for any OpenAI-compatible chat completions endpoint.
///
/// Covers the cloud-social backend (xAI's Grok speaks this protocol) and any
/// other compatible server the deployment points it at.
pub struct OpenAiCompatAdapter {
    profile: ProviderProfile,
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatAdapter {
    pub fn new(profile: ProviderProfile, api_key: String, base_url: String, model: String) -> Self {
        Self {
            profile,
            client: Client::new(),
            api_key,
            base_url,
            model,
        }
    }

    fn build_request_body(&self, request: &LlmRequest) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(ref system) = request.system {
            messages.push(serde_json::json!({
                "role": "system",
                "content": system,
            }));
        }

        for turn in &request.messages {
            match turn.role {
                Role::Assistant if !turn.tool_calls.is_empty() => {
                    let tool_calls: Vec<serde_json::Value> = turn
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            serde_json::json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.tool_name,
                                    "arguments": tc.arguments.to_string(),
                                },
                            })
                        })
                        .collect();
                    messages.push(serde_json::json!({
                        "role": "assistant",
                        "content": turn.content,
                        "tool_calls": tool_calls,
                    }));
                }
                Role::Tool => {
                    messages.push(serde_json::json!({
                        "role": "tool",
                        "tool_call_id": turn.tool_call_id.as_deref().unwrap_or(""),
                        "content": turn.content,
                    }));
                }
                _ => {
                    let role = match turn.role {
                        Role::System => "system",
                        Role::Assistant => "assistant",
                        _ => "user",
                    };
                    messages.push(serde_json::json!({
                        "role": role,
                        "content": turn.content,
                    }));
                }
            }
        }

        let mut body = serde_json::json!({
            "model": &self.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        },
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }

        body
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = self.build_request_body(request);
        debug!(model = %self.model, base_url = %self.base_url, "sending chat completions request");

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
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

        let choice = &data["choices"][0];
        let message = &choice["message"];
        let content = message["content"].as_str().unwrap_or("").to_string();

        let tool_calls: Vec<ToolCall> = message["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|c| {
                        let function = &c["function"];
                        let arguments = function["arguments"]
                            .as_str()
                            .and_then(|s| serde_json::from_str(s).ok())
                            .unwrap_or(serde_json::Value::Null);
                        Some(ToolCall {
                            id: c["id"].as_str()?.to_string(),
                            tool_name: function["name"].as_str()?.to_string(),
                            arguments,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let stop_reason = match choice["finish_reason"].as_str() {
            Some("tool_calls") => StopReason::ToolUse,
            Some("length") => StopReason::MaxTokens,
            Some("content_filter") => StopReason::ContentFilter,
            _ => StopReason::EndTurn,
        };

        let usage_data = &data["usage"];

        Ok(LlmResponse {
            content,
            tool_calls,
            usage: Usage {
                input_tokens: usage_data["prompt_tokens"].as_u64().unwrap_or(0) as u32,
                output_tokens: usage_data["completion_tokens"].as_u64().unwrap_or(0) as u32,
            },
            stop_reason,
        })
    }

    async fn health_check(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(FennecError::Provider("API key not set".into()));
        }
        Ok(())
    }
}
