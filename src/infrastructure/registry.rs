//! Per-provider circuit-breaker state and rolling performance stats.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::{Alert, AlertLevel, ProviderHealth, ProviderKey};

/// Weight of the newest sample in the response-time blend.
const RESPONSE_TIME_ALPHA: f64 = 0.3;

/// Mutable health state for one (provider, model).
#[derive(Debug)]
struct HealthCell {
    consecutive_failures: u32,
    circuit_open: bool,
    circuit_opened_at: Option<Instant>,
    last_success_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    avg_response_time_ms: f64,
    total_calls: u64,
    total_failures: u64,
}

impl HealthCell {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            circuit_open: false,
            circuit_opened_at: None,
            last_success_at: None,
            last_error: None,
            avg_response_time_ms: 0.0,
            total_calls: 0,
            total_failures: 0,
        }
    }
}

/// Tracks circuit-breaker state and rolling stats per (provider, model).
///
/// Each cell sits behind its own mutex so unrelated providers never contend;
/// the outer map is only write-locked when a new provider first appears. The
/// in-memory state is authoritative for dispatch decisions.
pub struct ProviderHealthRegistry {
    cells: RwLock<HashMap<ProviderKey, Arc<Mutex<HealthCell>>>>,
    threshold: u32,
    cooldown: Duration,
    alert_tx: Option<UnboundedSender<Alert>>,
}

impl std::fmt::Debug for ProviderHealthRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHealthRegistry")
            .field("threshold", &self.threshold)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}

/// A poisoned lock only means another task panicked mid-update; the cell
/// data itself is still coherent, so recover the guard.
fn lock(cell: &Mutex<HealthCell>) -> MutexGuard<'_, HealthCell> {
    cell.lock().unwrap_or_else(|e| e.into_inner())
}

impl ProviderHealthRegistry {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
            threshold,
            cooldown,
            alert_tx: None,
        }
    }

    /// Route circuit-open alerts into `tx`; the owner drains them into the
    /// persistence layer.
    pub fn with_alert_sink(mut self, tx: UnboundedSender<Alert>) -> Self {
        self.alert_tx = Some(tx);
        self
    }

    /// Pre-create healthy entries for every known provider.
    pub fn register_all<'a>(&self, keys: impl IntoIterator<Item = &'a ProviderKey>) {
        let mut cells = self.cells.write().unwrap_or_else(|e| e.into_inner());

        for key in keys {
            cells
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(HealthCell::new())));
        }
    }

    /// Get or create the cell for a key.
    fn cell(&self, key: &ProviderKey) -> Arc<Mutex<HealthCell>> {
        {
            let cells = self.cells.read().unwrap_or_else(|e| e.into_inner());

            if let Some(cell) = cells.get(key) {
                return cell.clone();
            }
        }

        let mut cells = self.cells.write().unwrap_or_else(|e| e.into_inner());
        cells
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(HealthCell::new())))
            .clone()
    }

    /// Record a successful call. Resets the failure streak and closes the
    /// circuit unconditionally.
    pub fn record_success(&self, key: &ProviderKey, response_time_ms: u64) {
        let cell = self.cell(key);
        let mut cell = lock(&cell);

        cell.total_calls += 1;
        cell.consecutive_failures = 0;
        cell.circuit_open = false;
        cell.circuit_opened_at = None;
        cell.last_success_at = Some(Utc::now());
        cell.last_error = None;

        let sample = response_time_ms as f64;
        cell.avg_response_time_ms = if cell.total_calls == 1 {
            sample
        } else {
            cell.avg_response_time_ms * (1.0 - RESPONSE_TIME_ALPHA) + sample * RESPONSE_TIME_ALPHA
        };

        metrics::counter!("swarm_provider_successes", "provider" => key.to_string()).increment(1);
    }

    /// Record an exhausted (final) call failure. Opens the circuit once the
    /// failure streak reaches the threshold and emits a warning alert.
    pub fn record_failure(&self, key: &ProviderKey, error: &str) {
        let cell = self.cell(key);
        let opened = {
            let mut cell = lock(&cell);

            cell.total_calls += 1;
            cell.total_failures += 1;
            cell.consecutive_failures += 1;
            cell.last_error = Some(error.to_string());

            if cell.consecutive_failures >= self.threshold && !cell.circuit_open {
                cell.circuit_open = true;
                cell.circuit_opened_at = Some(Instant::now());
                Some(cell.consecutive_failures)
            } else {
                None
            }
        };

        metrics::counter!("swarm_provider_failures", "provider" => key.to_string()).increment(1);

        if let Some(failures) = opened {
            warn!(provider = %key, failures, "circuit breaker opened");
            metrics::counter!("swarm_circuit_trips", "provider" => key.to_string()).increment(1);
            self.raise_circuit_alert(key, failures, error);
        }
    }

    /// Clear an open circuit whose cooldown has elapsed. The next dispatched
    /// call becomes the trial that closes the breaker (by succeeding) or
    /// reopens it.
    fn expire_cooldown(&self, key: &ProviderKey, cell: &mut HealthCell) {
        if cell.circuit_open
            && cell
                .circuit_opened_at
                .is_some_and(|opened_at| opened_at.elapsed() >= self.cooldown)
        {
            debug!(provider = %key, "circuit cooldown elapsed, admitting trial call");
            cell.circuit_open = false;
            cell.circuit_opened_at = None;
        }
    }

    /// Whether a call may be dispatched to this provider right now.
    /// Cooldown expiry is evaluated lazily on read.
    pub fn is_dispatchable(&self, key: &ProviderKey) -> bool {
        let cell = self.cell(key);
        let mut cell = lock(&cell);

        self.expire_cooldown(key, &mut cell);
        !cell.circuit_open
    }

    /// Snapshot of one provider's health. Applies the same lazy cooldown
    /// expiry as dispatch, so an elapsed cooldown never reads as open.
    pub fn health(&self, key: &ProviderKey) -> ProviderHealth {
        let cell = self.cell(key);
        let mut cell = lock(&cell);

        self.expire_cooldown(key, &mut cell);

        ProviderHealth {
            key: key.clone(),
            is_healthy: !cell.circuit_open && cell.consecutive_failures < self.threshold,
            consecutive_failures: cell.consecutive_failures,
            circuit_open: cell.circuit_open,
            last_success_at: cell.last_success_at,
            avg_response_time_ms: cell.avg_response_time_ms,
            total_calls: cell.total_calls,
            total_failures: cell.total_failures,
        }
    }

    /// Snapshot of every registered provider.
    pub fn snapshot(&self) -> Vec<ProviderHealth> {
        let keys: Vec<ProviderKey> = {
            let cells = self.cells.read().unwrap_or_else(|e| e.into_inner());
            cells.keys().cloned().collect()
        };

        keys.iter().map(|key| self.health(key)).collect()
    }

    pub fn healthy_count(&self) -> usize {
        self.snapshot().iter().filter(|h| h.is_healthy).count()
    }

    pub fn open_circuit_count(&self) -> usize {
        self.snapshot().iter().filter(|h| h.circuit_open).count()
    }

    fn raise_circuit_alert(&self, key: &ProviderKey, failures: u32, error: &str) {
        let Some(tx) = &self.alert_tx else {
            return;
        };

        let alert = Alert::new(
            AlertLevel::Warning,
            key.to_string(),
            format!("Circuit opened for {key} after {failures} consecutive failures"),
        )
        .with_provider(key.to_string())
        .with_data(serde_json::json!({
            "consecutive_failures": failures,
            "last_error": error,
        }));

        if tx.send(alert).is_err() {
            debug!(provider = %key, "alert sink closed, dropping circuit alert");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn key() -> ProviderKey {
        ProviderKey::new("openai", "gpt-4o-mini")
    }

    fn registry() -> ProviderHealthRegistry {
        ProviderHealthRegistry::new(5, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn unknown_provider_starts_healthy_and_dispatchable() {
        let registry = registry();

        assert!(registry.is_dispatchable(&key()));

        let health = registry.health(&key());
        assert!(health.is_healthy);
        assert!(!health.circuit_open);
        assert_eq!(health.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn circuit_opens_exactly_at_threshold() {
        let registry = registry();

        for _ in 0..4 {
            registry.record_failure(&key(), "timeout");
        }
        assert!(!registry.health(&key()).circuit_open);
        assert!(registry.is_dispatchable(&key()));

        registry.record_failure(&key(), "timeout");
        let health = registry.health(&key());
        assert!(health.circuit_open);
        assert!(!health.is_healthy);
        assert!(!registry.is_dispatchable(&key()));
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_blocks_until_cooldown_then_admits_trial() {
        let registry = registry();

        for _ in 0..5 {
            registry.record_failure(&key(), "timeout");
        }
        assert!(!registry.is_dispatchable(&key()));

        // one minute later: still within the five-minute cooldown
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!registry.is_dispatchable(&key()));

        tokio::time::advance(Duration::from_secs(240)).await;
        assert!(registry.is_dispatchable(&key()));

        // a failed trial reopens immediately, a fresh cooldown starts
        registry.record_failure(&key(), "still down");
        assert!(!registry.is_dispatchable(&key()));
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reflects_cooldown_expiry_without_dispatch() {
        let registry = registry();

        for _ in 0..5 {
            registry.record_failure(&key(), "timeout");
        }
        assert!(registry.health(&key()).circuit_open);
        assert_eq!(registry.open_circuit_count(), 1);

        tokio::time::advance(Duration::from_secs(301)).await;

        // no call dispatched in between, yet the read must not report open
        let health = registry.health(&key());
        assert!(!health.circuit_open);
        assert_eq!(registry.open_circuit_count(), 0);
        // the streak survives until a trial call succeeds
        assert!(!health.is_healthy);
        assert_eq!(health.consecutive_failures, 5);
    }

    #[tokio::test]
    async fn success_resets_streak_and_closes_circuit() {
        let registry = registry();

        for _ in 0..5 {
            registry.record_failure(&key(), "timeout");
        }
        registry.record_success(&key(), 1200);

        let health = registry.health(&key());
        assert!(!health.circuit_open);
        assert!(health.is_healthy);
        assert_eq!(health.consecutive_failures, 0);
        assert!(health.last_success_at.is_some());
    }

    #[tokio::test]
    async fn response_time_is_exponentially_blended() {
        let registry = registry();

        registry.record_success(&key(), 1000);
        assert_eq!(registry.health(&key()).avg_response_time_ms, 1000.0);

        registry.record_success(&key(), 2000);
        let avg = registry.health(&key()).avg_response_time_ms;
        assert!((avg - 1300.0).abs() < f64::EPSILON, "got {avg}");
    }

    #[tokio::test]
    async fn circuit_open_emits_warning_alert_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry =
            ProviderHealthRegistry::new(2, Duration::from_secs(300)).with_alert_sink(tx);

        registry.record_failure(&key(), "boom");
        registry.record_failure(&key(), "boom");
        // further failures while open must not re-alert
        registry.record_failure(&key(), "boom");

        let alert = rx.try_recv().expect("one circuit alert");
        assert_eq!(alert.level, AlertLevel::Warning);
        assert_eq!(alert.subject, key().to_string());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn snapshot_counts_unhealthy_and_open() {
        let registry = ProviderHealthRegistry::new(2, Duration::from_secs(300));
        let good = ProviderKey::new("anthropic", "claude-3-haiku");

        registry.register_all([&key(), &good]);
        registry.record_failure(&key(), "boom");
        registry.record_failure(&key(), "boom");

        assert_eq!(registry.snapshot().len(), 2);
        assert_eq!(registry.healthy_count(), 1);
        assert_eq!(registry.open_circuit_count(), 1);
    }
}
