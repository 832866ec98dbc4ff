//! Background health probing of every known provider.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::{Instant, timeout};
use tracing::{debug, error, warn};

use crate::domain::{Alert, AlertLevel, ProviderSet, ResultStore, SwarmError};

use super::registry::ProviderHealthRegistry;

/// Periodically exercises each provider with a lightweight probe so health
/// status flips proactively and open circuits get their trial call after
/// cooldown. Providers with an open, unexpired circuit are skipped for the
/// round.
pub struct HealthProber {
    registry: Arc<ProviderHealthRegistry>,
    providers: Arc<ProviderSet>,
    store: Arc<dyn ResultStore>,
    interval: Duration,
    probe_timeout: Duration,
    min_successful: usize,
}

impl std::fmt::Debug for HealthProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthProber")
            .field("interval", &self.interval)
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}

impl HealthProber {
    pub fn new(
        registry: Arc<ProviderHealthRegistry>,
        providers: Arc<ProviderSet>,
        store: Arc<dyn ResultStore>,
        interval: Duration,
        probe_timeout: Duration,
        min_successful: usize,
    ) -> Self {
        Self {
            registry,
            providers,
            store,
            interval,
            probe_timeout,
            min_successful,
        }
    }

    /// Probe loop; runs until the owning task is aborted.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Err(error) = self.probe_round().await {
                error!(%error, "health probe round failed");
            }
        }
    }

    /// One probe round over every dispatchable provider. Returns the number
    /// of healthy providers after the round.
    pub async fn probe_round(&self) -> Result<usize, SwarmError> {
        let probes = self.providers.iter().filter_map(|(key, provider)| {
            if !self.registry.is_dispatchable(key) {
                debug!(provider = %key, "skipping probe, circuit open");
                return None;
            }

            let provider = provider.clone();
            Some(async move {
                let started = Instant::now();
                let result = timeout(self.probe_timeout, provider.probe(key.model())).await;

                match result {
                    Ok(Ok(())) => {
                        let elapsed = started.elapsed().as_millis() as u64;
                        self.registry.record_success(key, elapsed);
                    }
                    Ok(Err(error)) => {
                        warn!(provider = %key, %error, "health probe failed");
                        self.registry.record_failure(key, &error.to_string());
                    }
                    Err(_) => {
                        warn!(provider = %key, "health probe timed out");
                        self.registry
                            .record_failure(key, "health probe timed out");
                    }
                }
            })
        });

        join_all(probes).await;

        let healthy = self.registry.healthy_count();
        if healthy < self.min_successful {
            warn!(
                healthy,
                required = self.min_successful,
                "healthy provider count below batch quorum"
            );
            self.raise_quorum_alert(healthy).await?;
        }

        Ok(healthy)
    }

    /// One unresolved quorum alert at a time; a persistent shortfall must
    /// not flood the store on every round.
    async fn raise_quorum_alert(&self, healthy: usize) -> Result<(), SwarmError> {
        let unresolved = self.store.unresolved_alerts().await?;
        if unresolved
            .iter()
            .any(|a| a.level == AlertLevel::Critical && a.subject == "healthy_providers")
        {
            return Ok(());
        }

        self.store
            .append_alert(
                Alert::new(
                    AlertLevel::Critical,
                    "healthy_providers",
                    format!(
                        "Only {healthy} healthy providers, {} required for a full batch",
                        self.min_successful
                    ),
                )
                .with_data(serde_json::json!({
                    "healthy": healthy,
                    "required": self.min_successful,
                })),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProviderKey;
    use crate::domain::mock::ScriptedProvider;
    use crate::infrastructure::storage::InMemoryResultStore;

    fn prober(
        providers: Vec<(ProviderKey, Arc<ScriptedProvider>)>,
        min_successful: usize,
    ) -> (Arc<HealthProber>, Arc<ProviderHealthRegistry>, Arc<InMemoryResultStore>) {
        let registry = Arc::new(ProviderHealthRegistry::new(2, Duration::from_secs(300)));
        let store = Arc::new(InMemoryResultStore::new());

        let prober = Arc::new(HealthProber::new(
            registry.clone(),
            Arc::new(crate::domain::mock::provider_set(providers)),
            store.clone(),
            Duration::from_secs(60),
            Duration::from_secs(10),
            min_successful,
        ));

        (prober, registry, store)
    }

    #[tokio::test]
    async fn probe_round_records_successes_and_failures() {
        let good = ProviderKey::new("openai", "gpt-4o-mini");
        let bad = ProviderKey::new("mistral", "mistral-small");
        let good_provider = Arc::new(ScriptedProvider::new("openai"));
        let bad_provider = Arc::new(ScriptedProvider::new("mistral").always_fail("503"));

        let (prober, registry, _store) = prober(
            vec![
                (good.clone(), good_provider.clone()),
                (bad.clone(), bad_provider.clone()),
            ],
            1,
        );

        let healthy = prober.probe_round().await.unwrap();

        assert_eq!(healthy, 2); // one failure does not cross the threshold of 2
        assert_eq!(registry.health(&good).total_calls, 1);
        assert_eq!(registry.health(&bad).consecutive_failures, 1);
        assert_eq!(good_provider.calls(), 1);
    }

    #[tokio::test]
    async fn open_unexpired_circuit_is_not_probed() {
        let key = ProviderKey::new("openai", "gpt-4o-mini");
        let provider = Arc::new(ScriptedProvider::new("openai"));

        let (prober, registry, _store) = prober(vec![(key.clone(), provider.clone())], 0);

        registry.record_failure(&key, "down");
        registry.record_failure(&key, "down");
        assert!(registry.health(&key).circuit_open);

        prober.probe_round().await.unwrap();
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_after_cooldown_closes_circuit_on_success() {
        let key = ProviderKey::new("openai", "gpt-4o-mini");
        let provider = Arc::new(ScriptedProvider::new("openai"));

        let (prober, registry, _store) = prober(vec![(key.clone(), provider.clone())], 0);

        registry.record_failure(&key, "down");
        registry.record_failure(&key, "down");

        tokio::time::advance(Duration::from_secs(301)).await;
        prober.probe_round().await.unwrap();

        assert_eq!(provider.calls(), 1);
        let health = registry.health(&key);
        assert!(!health.circuit_open);
        assert!(health.is_healthy);
    }

    #[tokio::test]
    async fn quorum_shortfall_raises_critical_alert() {
        let key = ProviderKey::new("openai", "gpt-4o-mini");
        let provider = Arc::new(ScriptedProvider::new("openai").always_fail("503"));

        let (prober, _registry, store) = prober(vec![(key, provider)], 8);

        prober.probe_round().await.unwrap();

        let alerts = store.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert_eq!(alerts[0].subject, "healthy_providers");
    }

    #[tokio::test]
    async fn persistent_shortfall_does_not_flood_the_store() {
        let key = ProviderKey::new("openai", "gpt-4o-mini");
        let provider = Arc::new(ScriptedProvider::new("openai").always_fail("503"));

        let (prober, _registry, store) = prober(vec![(key, provider)], 8);

        prober.probe_round().await.unwrap();
        prober.probe_round().await.unwrap();
        prober.probe_round().await.unwrap();
        assert_eq!(store.alerts().len(), 1);

        // resolving clears the dedup guard; the next round re-raises
        let id = store.alerts()[0].id.clone();
        store.resolve_alert(&id).await.unwrap();
        prober.probe_round().await.unwrap();
        assert_eq!(store.alerts().len(), 2);
    }
}
