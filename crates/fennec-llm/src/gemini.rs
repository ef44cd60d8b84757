use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use fennec_core::{Capability, FennecError, Result, Role};

use crate::profile::ProviderProfile;
use crate::provider::*;

/// Google Gemini generateContent adapter — the cloud-search backend.
///
/// When the request requires the `Search` capability, Google Search
/// grounding is enabled so answers are web-augmented.
pub struct GeminiAdapter {
    profile: ProviderProfile,
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiAdapter {
    pub fn new(profile: ProviderProfile, api_key: String, model: String) -> Self {
        Self {
            profile,
            client: Client::new(),
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            model,
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn build_request_body(&self, request: &LlmRequest) -> serde_json::Value {
        // Gemini only knows "user" and "model" roles; tool results and
        // system-tagged recall context travel as user parts.
        let contents: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                serde_json::json!({
                    "role": role,
                    "parts": [{ "text": turn.content }],
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens,
            },
        });

        if let Some(ref system) = request.system {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{ "text": system }],
            });
        }

        // Grounded search for search-classified requests
        if request
            .required_capabilities
            .contains(&Capability::Search)
        {
            body["tools"] = serde_json::json!([{ "google_search": {} }]);
        }

        body
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = self.build_request_body(request);
        debug!(model = %self.model, "sending Gemini API request");

        let resp = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
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

        let candidate = &data["candidates"][0];
        let content = candidate["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let stop_reason = match candidate["finishReason"].as_str() {
            Some("MAX_TOKENS") => StopReason::MaxTokens,
            Some("SAFETY") => StopReason::ContentFilter,
            _ => StopReason::EndTurn,
        };

        let usage_data = &data["usageMetadata"];

        Ok(LlmResponse {
            content,
            tool_calls: vec![],
            usage: Usage {
                input_tokens: usage_data["promptTokenCount"].as_u64().unwrap_or(0) as u32,
                output_tokens: usage_data["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
            },
            stop_reason,
        })
    }

    async fn health_check(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(FennecError::Provider("GEMINI_API_KEY not set".into()));
        }
        Ok(())
    }
}
