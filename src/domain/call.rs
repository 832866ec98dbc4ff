use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::ProviderKey;

/// One expected provider call within a batch: (provider, model, prompt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSpec {
    pub key: ProviderKey,
    pub prompt_kind: String,
    pub prompt: String,
}

impl CallSpec {
    pub fn new(
        key: ProviderKey,
        prompt_kind: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            key,
            prompt_kind: prompt_kind.into(),
            prompt: prompt.into(),
        }
    }
}

/// A prompt template with a `{domain}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub kind: String,
    pub text: String,
}

impl PromptTemplate {
    pub fn new(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: text.into(),
        }
    }

    pub fn render(&self, domain: &str) -> String {
        self.text.replace("{domain}", domain)
    }
}

/// Final outcome of one provider call, created exactly once per exhausted
/// call and owned by the batch coordinator that requested it.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Success(CallSuccess),
    Failure(CallFailure),
}

impl CallOutcome {
    pub fn key(&self) -> &ProviderKey {
        match self {
            Self::Success(s) => &s.key,
            Self::Failure(f) => &f.key,
        }
    }

    pub fn retry_count(&self) -> u32 {
        match self {
            Self::Success(s) => s.retry_count,
            Self::Failure(f) => f.retry_count,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallSuccess {
    pub key: ProviderKey,
    pub prompt_kind: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Monotonic completion instant, used for temporal variance.
    pub completed_at: Instant,
    pub response_time_ms: u64,
    pub retry_count: u32,
}

#[derive(Debug, Clone)]
pub struct CallFailure {
    pub key: ProviderKey,
    pub prompt_kind: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
    pub is_final: bool,
}

/// Per-call quality annotation recorded alongside persisted results.
///
/// Flags are additive; a call with none of the degradations is tagged
/// `high_quality`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    Retried,
    SlowResponse,
    TemporalDrift,
    IncompleteBatch,
    HighQuality,
}

impl QualityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retried => "retried",
            Self::SlowResponse => "slow_response",
            Self::TemporalDrift => "temporal_drift",
            Self::IncompleteBatch => "incomplete_batch",
            Self::HighQuality => "high_quality",
        }
    }

    /// Render a flag set as the comma-joined form used in persisted records.
    pub fn render(flags: &[QualityFlag]) -> String {
        flags
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}
