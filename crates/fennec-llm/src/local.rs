use async_trait::async_trait;
use tracing::debug;

use fennec_core::{FennecError, Result, Role};

use crate::profile::ProviderProfile;
use crate::provider::*;

/// Local model adapter — wraps an Ollama-style inference server.
///
/// Local inference carries a cost weight of 0, so the router prefers it for
/// any request whose capability tags it can serve.
pub struct LocalAdapter {
    profile: ProviderProfile,
    client: reqwest::Client,
    /// Address of the local inference server (e.g. "http://127.0.0.1:11434")
    base_url: String,
    model: String,
}

impl LocalAdapter {
    pub fn new(profile: ProviderProfile, base_url: String, model: String) -> Self {
        Self {
            profile,
            client: reqwest::Client::new(),
            base_url,
            model,
        }
    }

    /// Default Ollama instance.
    pub fn ollama(profile: ProviderProfile, model: &str) -> Self {
        Self::new(profile, "http://127.0.0.1:11434".into(), model.to_string())
    }
}

#[async_trait]
impl ProviderAdapter for LocalAdapter {
    fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let mut messages = Vec::new();

        if let Some(ref system) = request.system {
            messages.push(serde_json::json!({
                "role": "system",
                "content": system,
            }));
        }

        for turn in &request.messages {
            let role = match turn.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            messages.push(serde_json::json!({
                "role": role,
                "content": turn.content,
            }));
        }

        let body = serde_json::json!({
            "model": &self.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            }
        });

        debug!(model = %self.model, "sending local model request");

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| FennecError::Provider(format!("local: {e}")))?;

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(FennecError::Provider(format!("local model error: {text}")));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| FennecError::Provider(e.to_string()))?;

        let content = data["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        Ok(LlmResponse {
            content,
            tool_calls: vec![],
            usage: Usage {
                input_tokens: data["prompt_eval_count"].as_u64().unwrap_or(0) as u32,
                output_tokens: data["eval_count"].as_u64().unwrap_or(0) as u32,
            },
            stop_reason: StopReason::EndTurn,
        })
    }

    async fn health_check(&self) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| FennecError::Provider(format!("local unreachable: {e}")))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(FennecError::Provider("local model server unhealthy".into()))
        }
    }
}
