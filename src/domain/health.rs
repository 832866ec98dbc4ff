use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ProviderKey;

/// Point-in-time view of one provider's health cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub key: ProviderKey,
    pub is_healthy: bool,
    pub consecutive_failures: u32,
    pub circuit_open: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub avg_response_time_ms: f64,
    pub total_calls: u64,
    pub total_failures: u64,
}

/// Rolling-window metrics computed by the monitoring aggregator on each
/// tick. Derived, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub generated_at: DateTime<Utc>,
    pub window_ms: u64,
    pub batches_observed: usize,
    pub avg_success_rate: f64,
    pub avg_temporal_variance_ms: f64,
    pub avg_response_time_ms: f64,
    pub unhealthy_providers: usize,
    pub open_circuits: usize,
    /// 0-100, fixed penalties subtracted per crossed threshold.
    pub health_score: u32,
    pub recommendations: Vec<String>,
}
