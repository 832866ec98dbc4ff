use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CallFailure, CallSuccess};

/// Batch identity, derived from the work item and its submission time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(String);

impl BatchId {
    pub fn derive(work_item_id: &str, submitted_at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}_{}",
            work_item_id,
            submitted_at.timestamp_millis()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Batch-level outcome, set exactly once at finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    Partial,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

/// Verdict on whether a batch's successes arrived together, in sufficient
/// number, within the allowed time spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynchronizationStatus {
    Synchronized,
    Partial,
    Failed,
}

impl SynchronizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synchronized => "synchronized",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

/// Final report returned by the batch coordinator.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: BatchId,
    pub work_item_id: String,
    pub status: BatchStatus,
    pub synchronization_status: SynchronizationStatus,
    pub results: Vec<CallSuccess>,
    pub failures: Vec<CallFailure>,
    pub expected_count: usize,
    pub temporal_variance_ms: u64,
    pub elapsed_ms: u64,
}

impl BatchReport {
    pub fn success(&self) -> bool {
        self.status == BatchStatus::Success
    }

    pub fn success_count(&self) -> usize {
        self.results.len()
    }

    pub fn success_rate(&self) -> f64 {
        if self.expected_count == 0 {
            0.0
        } else {
            self.results.len() as f64 / self.expected_count as f64
        }
    }

    pub fn avg_response_time_ms(&self) -> f64 {
        if self.results.is_empty() {
            0.0
        } else {
            self.results
                .iter()
                .map(|r| r.response_time_ms as f64)
                .sum::<f64>()
                / self.results.len() as f64
        }
    }
}
