use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Alert, AlertId, BatchId, ProviderKey, SwarmError, SynchronizationStatus};

/// One persisted, quality-flagged provider response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub work_item_id: String,
    pub key: ProviderKey,
    pub prompt_kind: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: u64,
    pub retry_count: u32,
    /// Comma-joined quality flags, e.g. `retried,slow_response`.
    pub quality_flags: String,
}

/// Per-batch quality summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchQualityRecord {
    pub work_item_id: String,
    pub batch_id: BatchId,
    pub success_rate: f64,
    pub temporal_variance_ms: u64,
    pub avg_response_time_ms: f64,
    pub synchronization_status: SynchronizationStatus,
    pub expected_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate over a rolling window of batch quality records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchQualityStats {
    pub batches: usize,
    pub avg_success_rate: f64,
    pub avg_temporal_variance_ms: f64,
    pub avg_response_time_ms: f64,
}

/// Minimal persistence contract the orchestration core requires.
///
/// Schema and archival policy are the implementation's concern. Any error
/// from these methods means the persistence layer is unavailable and is
/// propagated as a hard [`SwarmError::Storage`] by the caller.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn append_call_result(&self, record: CallRecord) -> Result<(), SwarmError>;

    async fn append_batch_quality(&self, record: BatchQualityRecord) -> Result<(), SwarmError>;

    async fn append_alert(&self, alert: Alert) -> Result<AlertId, SwarmError>;

    async fn resolve_alert(&self, id: &AlertId) -> Result<(), SwarmError>;

    /// Currently unresolved alerts, used for deduplication.
    async fn unresolved_alerts(&self) -> Result<Vec<Alert>, SwarmError>;

    /// Aggregate stats over batch quality records newer than `window`.
    async fn recent_batch_quality(&self, window: Duration)
    -> Result<BatchQualityStats, SwarmError>;
}
