//! Adapter for the Anthropic messages API.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::domain::{LlmProvider, SwarmError};

use super::openai_compat::classify_http_error;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

#[derive(Debug)]
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn invoke(
        &self,
        model: &str,
        prompt: &str,
        work_item_id: &str,
    ) -> Result<String, SwarmError> {
        debug!(provider = "anthropic", model, work_item_id, "dispatching message");

        let body = serde_json::json!({
            "model": model,
            "max_tokens": MAX_TOKENS,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| SwarmError::provider("anthropic", format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_error("anthropic", status, &body));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| SwarmError::provider("anthropic", format!("invalid body: {e}")))?;

        let text = parsed
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(SwarmError::provider("anthropic", "empty content in response"));
        }

        Ok(text)
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn invoke_joins_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_01",
                "model": "claude-sonnet-4-20250514",
                "content": [
                    { "type": "text", "text": "first " },
                    { "type": "text", "text": "second" }
                ]
            })))
            .mount(&server)
            .await;

        let provider =
            AnthropicProvider::with_base_url(reqwest::Client::new(), "test-key", server.uri());

        let content = provider
            .invoke("claude-sonnet-4-20250514", "Analyze example.com", "example.com")
            .await
            .unwrap();

        assert_eq!(content, "first second");
    }

    #[tokio::test]
    async fn overloaded_maps_to_retryable_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let provider =
            AnthropicProvider::with_base_url(reqwest::Client::new(), "test-key", server.uri());

        let error = provider
            .invoke("claude-sonnet-4-20250514", "prompt", "example.com")
            .await
            .unwrap_err();

        assert!(error.is_retryable());
    }
}
