//! Provider adapters and the environment-driven provider set factory.

mod anthropic;
mod openai_compat;

use std::time::Duration;

use tracing::info;

use crate::domain::{ProviderKey, ProviderSet, SwarmError};

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;

/// Known OpenAI-compatible providers: name, API key env var, base URL and the
/// model dispatched by default.
const OPENAI_COMPAT_PROVIDERS: &[(&str, &str, &str, &str)] = &[
    ("openai", "OPENAI_API_KEY", "https://api.openai.com", "gpt-4o-mini"),
    ("groq", "GROQ_API_KEY", "https://api.groq.com/openai", "llama-3.3-70b-versatile"),
    ("together", "TOGETHER_API_KEY", "https://api.together.xyz", "meta-llama/Llama-3.3-70B-Instruct-Turbo"),
    ("perplexity", "PERPLEXITY_API_KEY", "https://api.perplexity.ai", "sonar"),
    ("deepseek", "DEEPSEEK_API_KEY", "https://api.deepseek.com", "deepseek-chat"),
    ("mistral", "MISTRAL_API_KEY", "https://api.mistral.ai", "mistral-small-latest"),
    ("xai", "XAI_API_KEY", "https://api.x.ai", "grok-3-mini"),
];

const ANTHROPIC_DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Build the provider set from whichever API keys are present in the
/// environment. Providers without a key are skipped; an empty result is a
/// configuration error.
pub fn providers_from_env() -> Result<ProviderSet, SwarmError> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| SwarmError::configuration(format!("failed to build http client: {e}")))?;

    let mut providers = ProviderSet::new();

    for (name, env_var, base_url, model) in OPENAI_COMPAT_PROVIDERS {
        if let Ok(api_key) = std::env::var(env_var) {
            if api_key.is_empty() {
                continue;
            }
            providers.insert(
                ProviderKey::new(*name, *model),
                std::sync::Arc::new(OpenAiCompatProvider::new(
                    client.clone(),
                    *name,
                    api_key,
                    *base_url,
                )),
            );
        }
    }

    if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
        if !api_key.is_empty() {
            providers.insert(
                ProviderKey::new("anthropic", ANTHROPIC_DEFAULT_MODEL),
                std::sync::Arc::new(AnthropicProvider::new(client.clone(), api_key)),
            );
        }
    }

    if providers.is_empty() {
        return Err(SwarmError::configuration(
            "no provider API keys configured; set at least one of OPENAI_API_KEY, \
             ANTHROPIC_API_KEY, GROQ_API_KEY, ...",
        ));
    }

    info!(count = providers.len(), "provider set configured from environment");
    Ok(providers)
}
