use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Alert identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(Uuid);

impl AlertId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Emergency => "emergency",
        }
    }
}

/// An operator-facing alert. Persisted immediately on creation; only the
/// `resolved` flag mutates afterwards.
///
/// `subject` is a stable key (a metric name or a provider key) used to
/// deduplicate against currently unresolved alerts of the same level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub level: AlertLevel,
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub batch_id: Option<String>,
    pub provider: Option<String>,
    pub data: serde_json::Value,
}

impl Alert {
    pub fn new(
        level: AlertLevel,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: AlertId::generate(),
            level,
            subject: subject.into(),
            message: message.into(),
            created_at: Utc::now(),
            resolved: false,
            batch_id: None,
            provider: None,
            data: serde_json::Value::Null,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}
