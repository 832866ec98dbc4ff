//! Top-level assembly of the swarm processing core.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::domain::{
    Alert, BatchReport, CallSpec, Notifier, ProviderHealth, ProviderSet, ResultStore, SwarmError,
};
use crate::infrastructure::admission::AdmissionController;
use crate::infrastructure::coordinator::BatchCoordinator;
use crate::infrastructure::executor::CallExecutor;
use crate::infrastructure::monitor::MonitoringAggregator;
use crate::infrastructure::prober::HealthProber;
use crate::infrastructure::registry::ProviderHealthRegistry;

/// Owns the wired-together processing core: registry, admission control,
/// batch coordination and the background health loops.
///
/// Construction wires everything; nothing runs until [`Orchestrator::start`]
/// spawns the background loops. Batch processing works without `start`, just
/// without probing or monitoring.
pub struct Orchestrator {
    registry: Arc<ProviderHealthRegistry>,
    coordinator: BatchCoordinator,
    prober: Arc<HealthProber>,
    monitor: Arc<MonitoringAggregator>,
    store: Arc<dyn ResultStore>,
    alert_rx: Mutex<Option<UnboundedReceiver<Alert>>>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        config: &AppConfig,
        providers: ProviderSet,
        store: Arc<dyn ResultStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let orch = &config.orchestrator;

        let (alert_tx, alert_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(
            ProviderHealthRegistry::new(
                orch.circuit_breaker_threshold,
                orch.circuit_breaker_timeout(),
            )
            .with_alert_sink(alert_tx),
        );
        registry.register_all(providers.keys());

        let providers = Arc::new(providers);
        let executor = Arc::new(CallExecutor::new(
            registry.clone(),
            orch.max_retries_per_llm,
            orch.llm_timeout(),
            orch.backoff_base(),
            orch.max_backoff(),
        ));

        let coordinator = BatchCoordinator::new(
            AdmissionController::new(orch.parallel_workers),
            executor,
            providers.clone(),
            store.clone(),
            orch.batch_timeout(),
            orch.min_successful_llms,
            orch.max_temporal_variance_ms,
            orch.slow_response_threshold_ms,
        );

        let prober = Arc::new(HealthProber::new(
            registry.clone(),
            providers,
            store.clone(),
            orch.health_check_interval(),
            orch.provider_health_timeout(),
            orch.min_successful_llms,
        ));

        let monitor = Arc::new(MonitoringAggregator::new(
            config.monitoring.clone(),
            registry.clone(),
            store.clone(),
            notifier,
        ));

        Self {
            registry,
            coordinator,
            prober,
            monitor,
            store,
            alert_rx: Mutex::new(Some(alert_rx)),
            background: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the background loops: registry alert drain, health probing and
    /// the monitoring aggregator. Idempotent; subsequent calls are no-ops.
    pub fn start(&self) {
        let Some(mut alert_rx) = self
            .alert_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        else {
            return;
        };

        let mut background = self.background.lock().unwrap_or_else(|e| e.into_inner());

        let store = self.store.clone();
        background.push(tokio::spawn(async move {
            while let Some(alert) = alert_rx.recv().await {
                if let Err(err) = store.append_alert(alert).await {
                    error!(error = %err, "failed to persist registry alert");
                }
            }
        }));

        background.push(tokio::spawn(self.prober.clone().run()));
        background.push(tokio::spawn(self.monitor.clone().run()));

        info!("orchestrator background loops started");
    }

    /// Process one work item against its expected call set.
    pub async fn process_batch(
        &self,
        work_item_id: &str,
        expected: Vec<CallSpec>,
    ) -> Result<BatchReport, SwarmError> {
        self.coordinator.process_batch(work_item_id, expected).await
    }

    /// Run one probe round immediately, outside the background schedule.
    pub async fn probe_once(&self) -> Result<usize, SwarmError> {
        self.prober.probe_round().await
    }

    /// Run one monitoring aggregation immediately.
    pub async fn monitor_once(&self) -> Result<crate::domain::HealthSnapshot, SwarmError> {
        self.monitor.tick().await
    }

    /// Current per-provider health, one entry per known (provider, model).
    pub fn provider_health(&self) -> Vec<ProviderHealth> {
        self.registry.snapshot()
    }

    /// Abort the background loops. In-flight batches are unaffected.
    pub fn shutdown(&self) {
        let mut background = self.background.lock().unwrap_or_else(|e| e.into_inner());
        for handle in background.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mock::ScriptedProvider;
    use crate::domain::{BatchStatus, NullNotifier, ProviderKey};
    use crate::infrastructure::storage::InMemoryResultStore;
    use std::time::Duration;

    fn small_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.orchestrator.min_successful_llms = 2;
        config
    }

    fn providers(count: usize) -> (ProviderSet, Vec<ProviderKey>) {
        let mut set = ProviderSet::new();
        let mut keys = Vec::new();
        for i in 0..count {
            let key = ProviderKey::new(format!("provider{i}"), "model");
            set.insert(
                key.clone(),
                Arc::new(ScriptedProvider::new(format!("provider{i}"))) as _,
            );
            keys.push(key);
        }
        (set, keys)
    }

    #[tokio::test]
    async fn end_to_end_batch_through_the_orchestrator() {
        let (set, keys) = providers(3);
        let store = Arc::new(InMemoryResultStore::new());
        let orchestrator = Orchestrator::new(
            &small_config(),
            set,
            store.clone(),
            Arc::new(NullNotifier),
        );

        let expected = keys
            .iter()
            .map(|key| CallSpec::new(key.clone(), "business_analysis", "Analyze example.com"))
            .collect();

        let report = orchestrator
            .process_batch("example.com", expected)
            .await
            .unwrap();

        assert_eq!(report.status, BatchStatus::Success);
        assert_eq!(report.success_count(), 3);
        assert_eq!(store.call_records().len(), 3);
        assert_eq!(store.batch_records().len(), 1);
    }

    #[tokio::test]
    async fn registry_alerts_reach_the_store_after_start() {
        let (set, keys) = providers(1);
        let store = Arc::new(InMemoryResultStore::new());
        let config = small_config();
        let threshold = config.orchestrator.circuit_breaker_threshold;
        let orchestrator =
            Orchestrator::new(&config, set, store.clone(), Arc::new(NullNotifier));
        orchestrator.start();

        for _ in 0..threshold {
            orchestrator.registry.record_failure(&keys[0], "down");
        }

        // give the drain task a turn
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(
            store
                .alerts()
                .iter()
                .any(|a| a.subject == keys[0].to_string())
        );
        orchestrator.shutdown();
    }

    #[tokio::test]
    async fn provider_health_covers_all_registered_keys() {
        let (set, _keys) = providers(4);
        let store = Arc::new(InMemoryResultStore::new());
        let orchestrator =
            Orchestrator::new(&small_config(), set, store, Arc::new(NullNotifier));

        assert_eq!(orchestrator.provider_health().len(), 4);
        assert!(orchestrator.provider_health().iter().all(|h| h.is_healthy));
    }
}
