use thiserror::Error;

/// Core orchestration errors
#[derive(Debug, Clone, Error)]
pub enum SwarmError {
    /// Transient provider failure (network, 5xx, rate limit). Retried.
    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    /// Provider-signalled permanent failure (auth, bad request). Never retried.
    #[error("Provider fatal error: {provider} - {message}")]
    ProviderFatal { provider: String, message: String },

    /// A single call attempt exceeded its timeout. Retried.
    #[error("Call to {provider} timed out after {timeout_ms}ms")]
    CallTimeout { provider: String, timeout_ms: u64 },

    /// Dispatch skipped because the provider's circuit is open.
    #[error("Circuit open for {provider}")]
    CircuitOpen { provider: String },

    /// The batch deadline elapsed before the call settled.
    #[error("Batch deadline exceeded")]
    BatchDeadlineExceeded,

    /// The persistence layer is unavailable. Propagated as a hard error.
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SwarmError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn provider_fatal(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderFatal {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn call_timeout(provider: impl Into<String>, timeout_ms: u64) -> Self {
        Self::CallTimeout {
            provider: provider.into(),
            timeout_ms,
        }
    }

    pub fn circuit_open(provider: impl Into<String>) -> Self {
        Self::CircuitOpen {
            provider: provider.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the call executor may retry after this error.
    ///
    /// The original system retried every error kind alike; only an error the
    /// provider adapter explicitly marks as permanent short-circuits retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::CallTimeout { .. })
    }
}
