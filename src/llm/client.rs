//! Generic LLM client port and a deterministic test/dev adapter.
//!
//! The real provider call (`LLM_RUNTIME_MODE=provider`) is an external
//! collaborator reached over HTTP; this crate depends only on the trait.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
#[error("llm request failed: {0}")]
pub struct LlmClientError(pub String);

#[async_trait]
pub trait LlmClientPort: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmClientError>;
}

/// Canned-response client used for `LLM_RUNTIME_MODE=deterministic` runs
/// (local/dev/test), mirroring the upstream `StaticLlmClient` test double
/// promoted to a first-class runtime mode.
pub struct DeterministicLlmClient {
    response_text: String,
}

impl DeterministicLlmClient {
    pub fn new(response_text: impl Into<String>) -> Self {
        Self { response_text: response_text.into() }
    }
}

#[async_trait]
impl LlmClientPort for DeterministicLlmClient {
    async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, LlmClientError> {
        Ok(self.response_text.clone())
    }
}

/// Chat-completions style client against a configured OpenAI-compatible endpoint.
pub struct OpenAiLlmClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiLlmClient {
    pub fn new(api_key: String, model: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), api_key, model: model.into() }
    }
}

#[async_trait]
impl LlmClientPort for OpenAiLlmClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmClientError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "response_format": {"type": "json_object"},
        });

        let response = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmClientError(e.to_string()))?;

        let status = response.status();
        let payload: serde_json::Value =
            response.json().await.map_err(|e| LlmClientError(e.to_string()))?;
        if !status.is_success() {
            return Err(LlmClientError(format!("provider returned {status}: {payload}")));
        }

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmClientError("provider response missing message content".to_string()))
    }
}
