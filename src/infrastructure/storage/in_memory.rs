//! In-memory implementation of the result store contract.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{
    Alert, AlertId, BatchQualityRecord, BatchQualityStats, CallRecord, ResultStore, SwarmError,
};

/// In-memory result store; the reference implementation of the persistence
/// contract, used by tests and standalone runs. Durable stores live behind
/// the same trait outside this crate.
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    call_records: RwLock<Vec<CallRecord>>,
    batch_records: RwLock<Vec<BatchQualityRecord>>,
    alerts: RwLock<HashMap<AlertId, Alert>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_records(&self) -> Vec<CallRecord> {
        self.call_records
            .read()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn batch_records(&self) -> Vec<BatchQualityRecord> {
        self.batch_records
            .read()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .read()
            .map(|alerts| alerts.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn append_call_result(&self, record: CallRecord) -> Result<(), SwarmError> {
        let mut records = self
            .call_records
            .write()
            .map_err(|e| SwarmError::storage(format!("failed to acquire write lock: {e}")))?;

        records.push(record);
        Ok(())
    }

    async fn append_batch_quality(&self, record: BatchQualityRecord) -> Result<(), SwarmError> {
        let mut records = self
            .batch_records
            .write()
            .map_err(|e| SwarmError::storage(format!("failed to acquire write lock: {e}")))?;

        records.push(record);
        Ok(())
    }

    async fn append_alert(&self, alert: Alert) -> Result<AlertId, SwarmError> {
        let mut alerts = self
            .alerts
            .write()
            .map_err(|e| SwarmError::storage(format!("failed to acquire write lock: {e}")))?;

        let id = alert.id.clone();
        alerts.insert(id.clone(), alert);
        Ok(id)
    }

    async fn resolve_alert(&self, id: &AlertId) -> Result<(), SwarmError> {
        let mut alerts = self
            .alerts
            .write()
            .map_err(|e| SwarmError::storage(format!("failed to acquire write lock: {e}")))?;

        match alerts.get_mut(id) {
            Some(alert) => {
                alert.resolved = true;
                Ok(())
            }
            None => Err(SwarmError::validation(format!("unknown alert id: {id}"))),
        }
    }

    async fn unresolved_alerts(&self) -> Result<Vec<Alert>, SwarmError> {
        let alerts = self
            .alerts
            .read()
            .map_err(|e| SwarmError::storage(format!("failed to acquire read lock: {e}")))?;

        Ok(alerts.values().filter(|a| !a.resolved).cloned().collect())
    }

    async fn recent_batch_quality(
        &self,
        window: Duration,
    ) -> Result<BatchQualityStats, SwarmError> {
        let records = self
            .batch_records
            .read()
            .map_err(|e| SwarmError::storage(format!("failed to acquire read lock: {e}")))?;

        let cutoff = Utc::now()
            - chrono::Duration::from_std(window)
                .map_err(|e| SwarmError::internal(format!("window out of range: {e}")))?;

        let recent: Vec<_> = records.iter().filter(|r| r.timestamp >= cutoff).collect();
        if recent.is_empty() {
            return Ok(BatchQualityStats::default());
        }

        let n = recent.len() as f64;
        Ok(BatchQualityStats {
            batches: recent.len(),
            avg_success_rate: recent.iter().map(|r| r.success_rate).sum::<f64>() / n,
            avg_temporal_variance_ms: recent
                .iter()
                .map(|r| r.temporal_variance_ms as f64)
                .sum::<f64>()
                / n,
            avg_response_time_ms: recent.iter().map(|r| r.avg_response_time_ms).sum::<f64>() / n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AlertLevel, BatchId, SynchronizationStatus};

    fn batch_record(success_rate: f64, variance_ms: u64) -> BatchQualityRecord {
        BatchQualityRecord {
            work_item_id: "example.com".to_string(),
            batch_id: BatchId::derive("example.com", Utc::now()),
            success_rate,
            temporal_variance_ms: variance_ms,
            avg_response_time_ms: 1500.0,
            synchronization_status: SynchronizationStatus::Synchronized,
            expected_count: 11,
            success_count: 9,
            failure_count: 2,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn aggregates_recent_batches() {
        let store = InMemoryResultStore::new();
        store
            .append_batch_quality(batch_record(1.0, 1_000))
            .await
            .unwrap();
        store
            .append_batch_quality(batch_record(0.5, 3_000))
            .await
            .unwrap();

        let stats = store
            .recent_batch_quality(Duration::from_secs(86_400))
            .await
            .unwrap();

        assert_eq!(stats.batches, 2);
        assert!((stats.avg_success_rate - 0.75).abs() < f64::EPSILON);
        assert!((stats.avg_temporal_variance_ms - 2_000.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn empty_window_yields_default_stats() {
        let store = InMemoryResultStore::new();
        let stats = store
            .recent_batch_quality(Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(stats.batches, 0);
        assert_eq!(stats.avg_success_rate, 0.0);
    }

    #[tokio::test]
    async fn resolve_flips_only_the_target_alert() {
        let store = InMemoryResultStore::new();
        let keep = store
            .append_alert(Alert::new(AlertLevel::Critical, "success_rate", "low"))
            .await
            .unwrap();
        let fix = store
            .append_alert(Alert::new(AlertLevel::Warning, "openai/gpt-4o-mini", "open"))
            .await
            .unwrap();

        store.resolve_alert(&fix).await.unwrap();

        let unresolved = store.unresolved_alerts().await.unwrap();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].id, keep);
    }
}
