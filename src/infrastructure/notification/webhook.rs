//! Webhook delivery of monitoring payloads.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::NotificationConfig;
use crate::domain::Notifier;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts each payload as JSON to every configured endpoint. Delivery is best
/// effort; failures are logged and never surface to the caller.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoints: Vec<String>,
}

impl WebhookNotifier {
    pub fn new(config: &NotificationConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            endpoints: config.endpoints.clone(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn push(&self, payload: serde_json::Value) {
        for endpoint in &self.endpoints {
            let result = self.client.post(endpoint).json(&payload).send().await;

            match result {
                Ok(response) if response.status().is_success() => {
                    debug!(endpoint, "notification delivered");
                }
                Ok(response) => {
                    warn!(
                        endpoint,
                        status = %response.status(),
                        "notification endpoint rejected payload"
                    );
                }
                Err(error) => {
                    warn!(endpoint, %error, "notification delivery failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_payload_to_every_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(&NotificationConfig {
            endpoints: vec![format!("{}/hooks/health", server.uri())],
        });

        notifier
            .push(serde_json::json!({ "health_score": 87 }))
            .await;
    }

    #[tokio::test]
    async fn endpoint_failure_does_not_panic_or_propagate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(&NotificationConfig {
            endpoints: vec![server.uri(), "http://127.0.0.1:9/unreachable".to_string()],
        });

        notifier.push(serde_json::json!({ "health_score": 0 })).await;
    }
}
