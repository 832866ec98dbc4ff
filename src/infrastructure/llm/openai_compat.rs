//! Adapter for OpenAI-style chat completions APIs.
//!
//! Most commercial providers in the swarm (OpenAI, Groq, Together, Mistral,
//! Perplexity, DeepSeek, xAI) expose the same `/v1/chat/completions` shape,
//! so a single adapter parameterized by name and base URL covers them all.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{LlmProvider, SwarmError};

const MAX_TOKENS: u32 = 1024;

/// Provider speaking the OpenAI chat completions wire format.
#[derive(Debug)]
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    name: String,
    auth_header: String,
    base_url: String,
}

impl OpenAiCompatProvider {
    pub fn new(
        client: reqwest::Client,
        name: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            auth_header: format!("Bearer {}", api_key.into()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn build_request(&self, model: &str, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": model,
            "messages": [ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            "max_tokens": MAX_TOKENS,
            "stream": false,
        })
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<String, SwarmError> {
        let response: ChatResponse = serde_json::from_value(json).map_err(|e| {
            SwarmError::provider(&self.name, format!("failed to parse response: {e}"))
        })?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| SwarmError::provider(&self.name, "no choices in response"))?;

        Ok(choice.message.content.unwrap_or_default())
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn invoke(
        &self,
        model: &str,
        prompt: &str,
        work_item_id: &str,
    ) -> Result<String, SwarmError> {
        debug!(provider = %self.name, model, work_item_id, "dispatching chat completion");

        let response = self
            .client
            .post(self.chat_completions_url())
            .header("Authorization", &self.auth_header)
            .json(&self.build_request(model, prompt))
            .send()
            .await
            .map_err(|e| SwarmError::provider(&self.name, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_error(&self.name, status, &body));
        }

        let json = response
            .json()
            .await
            .map_err(|e| SwarmError::provider(&self.name, format!("invalid body: {e}")))?;
        self.parse_response(json)
    }

    fn provider_name(&self) -> &str {
        &self.name
    }
}

/// Auth and malformed-request failures will not improve on retry; everything
/// else (rate limits, server errors) is transient.
pub(super) fn classify_http_error(
    provider: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> SwarmError {
    let message = format!("HTTP {status}: {}", body.chars().take(200).collect::<String>());

    match status.as_u16() {
        400 | 401 | 403 | 404 => SwarmError::provider_fatal(provider, message),
        _ => SwarmError::provider(provider, message),
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}
