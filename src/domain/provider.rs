use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::SwarmError;

/// Stable identity of one (provider, model) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderKey {
    provider: String,
    model: String,
}

impl ProviderKey {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// The set of providers a swarm dispatches to, keyed by (provider, model).
pub type ProviderSet = HashMap<ProviderKey, Arc<dyn LlmProvider>>;

/// Trait for LLM providers (OpenAI, Anthropic, etc.)
///
/// The core treats `invoke` as an opaque async operation; adapters map
/// transport-level failures to [`SwarmError::Provider`] (transient) or
/// [`SwarmError::ProviderFatal`] (never retried). Implementations must be
/// cancellation-safe: dropping the future must abandon the network call.
#[async_trait]
pub trait LlmProvider: Send + Sync + fmt::Debug {
    /// Invoke the provider with a fully rendered prompt for one work item.
    async fn invoke(
        &self,
        model: &str,
        prompt: &str,
        work_item_id: &str,
    ) -> Result<String, SwarmError>;

    /// Lightweight liveness probe used by the health prober.
    async fn probe(&self, model: &str) -> Result<(), SwarmError> {
        self.invoke(model, "ping", "healthcheck").await.map(|_| ())
    }

    /// The provider name (without model).
    fn provider_name(&self) -> &str;
}
