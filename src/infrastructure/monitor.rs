//! Periodic health aggregation, scoring, alerting and recommendations.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::MonitoringConfig;
use crate::domain::{
    Alert, AlertLevel, HealthSnapshot, Notifier, ResultStore, SwarmError,
};

use super::registry::ProviderHealthRegistry;

/// Aggregates batch quality and provider health into a scored snapshot on a
/// fixed interval, raising alerts for crossed thresholds and pushing the
/// snapshot to external channels.
///
/// Critical and emergency alerts are deduplicated against unresolved alerts
/// of the same level and subject so a persistent condition raises exactly one
/// alert until it is resolved. Warnings never alert; they surface as
/// recommendations on the snapshot instead.
pub struct MonitoringAggregator {
    config: MonitoringConfig,
    registry: Arc<ProviderHealthRegistry>,
    store: Arc<dyn ResultStore>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for MonitoringAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoringAggregator")
            .field("config", &self.config)
            .finish()
    }
}

impl MonitoringAggregator {
    pub fn new(
        config: MonitoringConfig,
        registry: Arc<ProviderHealthRegistry>,
        store: Arc<dyn ResultStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            registry,
            store,
            notifier,
        }
    }

    /// Aggregation loop; runs until the owning task is aborted.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.tick().await {
                Ok(snapshot) => {
                    info!(
                        health_score = snapshot.health_score,
                        batches = snapshot.batches_observed,
                        "monitoring tick complete"
                    );
                }
                Err(err) => error!(error = %err, "monitoring tick failed"),
            }
        }
    }

    /// One aggregation pass: compute the snapshot, raise alerts, push it out.
    pub async fn tick(&self) -> Result<HealthSnapshot, SwarmError> {
        let stats = self.store.recent_batch_quality(self.config.window()).await?;
        let providers = self.registry.snapshot();

        let unhealthy = providers.iter().filter(|p| !p.is_healthy).count();
        let open_circuits = providers.iter().filter(|p| p.circuit_open).count();

        let mut score: i64 = 100;
        let mut recommendations = Vec::new();
        let mut alerts = Vec::new();
        let cfg = &self.config;

        // Penalties are fixed per crossed threshold; critical supersedes the
        // matching warning for the same metric. Every violated threshold
        // contributes a recommendation, critical ones alert on top.
        if stats.batches > 0 {
            if stats.avg_success_rate < cfg.success_rate_critical {
                score -= 40;
                alerts.push((
                    AlertLevel::Critical,
                    "success_rate".to_string(),
                    format!(
                        "Average success rate {:.2} below critical floor {:.2}",
                        stats.avg_success_rate, cfg.success_rate_critical
                    ),
                ));
                recommendations.push(format!(
                    "Success rate {:.2} is below the critical floor {:.2}; review failing providers",
                    stats.avg_success_rate, cfg.success_rate_critical
                ));
            } else if stats.avg_success_rate < cfg.success_rate_warning {
                score -= 20;
                recommendations.push(format!(
                    "Success rate {:.2} is below target {:.2}; review failing providers",
                    stats.avg_success_rate, cfg.success_rate_warning
                ));
            }

            if stats.avg_temporal_variance_ms > cfg.variance_critical_ms as f64 {
                score -= 20;
                alerts.push((
                    AlertLevel::Critical,
                    "temporal_variance".to_string(),
                    format!(
                        "Average temporal variance {:.0}ms exceeds critical ceiling {}ms",
                        stats.avg_temporal_variance_ms, cfg.variance_critical_ms
                    ),
                ));
                recommendations.push(format!(
                    "Temporal variance {:.0}ms exceeds the critical ceiling {}ms; consider tightening per-call timeouts",
                    stats.avg_temporal_variance_ms, cfg.variance_critical_ms
                ));
            } else if stats.avg_temporal_variance_ms > cfg.variance_warning_ms as f64 {
                score -= 10;
                recommendations.push(format!(
                    "Temporal variance {:.0}ms exceeds target {}ms; consider tightening per-call timeouts",
                    stats.avg_temporal_variance_ms, cfg.variance_warning_ms
                ));
            }

            if stats.avg_response_time_ms > cfg.response_time_critical_ms {
                score -= 15;
                alerts.push((
                    AlertLevel::Critical,
                    "response_time".to_string(),
                    format!(
                        "Average response time {:.0}ms exceeds critical ceiling {:.0}ms",
                        stats.avg_response_time_ms, cfg.response_time_critical_ms
                    ),
                ));
                recommendations.push(format!(
                    "Response time {:.0}ms exceeds the critical ceiling {:.0}ms; slow providers may need removal",
                    stats.avg_response_time_ms, cfg.response_time_critical_ms
                ));
            } else if stats.avg_response_time_ms > cfg.response_time_warning_ms {
                score -= 7;
                recommendations.push(format!(
                    "Response time {:.0}ms exceeds target {:.0}ms; slow providers may need removal",
                    stats.avg_response_time_ms, cfg.response_time_warning_ms
                ));
            }
        }

        if unhealthy > cfg.max_unhealthy_providers {
            score -= 15;
            alerts.push((
                AlertLevel::Critical,
                "unhealthy_providers".to_string(),
                format!(
                    "{unhealthy} unhealthy providers, tolerated maximum is {}",
                    cfg.max_unhealthy_providers
                ),
            ));
            recommendations.push(format!(
                "{unhealthy} providers are unhealthy, above the tolerated {}; check provider status pages",
                cfg.max_unhealthy_providers
            ));
        }

        if open_circuits > cfg.max_open_circuits {
            score -= 10;
            recommendations.push(format!(
                "{open_circuits} open circuits exceed the tolerated {}; check provider status pages",
                cfg.max_open_circuits
            ));
        }

        let health_score = score.max(0) as u32;
        if health_score < 50 {
            alerts.push((
                AlertLevel::Emergency,
                "health_score".to_string(),
                format!("Overall health score dropped to {health_score}"),
            ));
        }

        for (level, subject, message) in alerts {
            self.raise(level, &subject, message).await?;
        }

        let snapshot = HealthSnapshot {
            generated_at: Utc::now(),
            window_ms: cfg.window_ms,
            batches_observed: stats.batches,
            avg_success_rate: stats.avg_success_rate,
            avg_temporal_variance_ms: stats.avg_temporal_variance_ms,
            avg_response_time_ms: stats.avg_response_time_ms,
            unhealthy_providers: unhealthy,
            open_circuits,
            health_score,
            recommendations,
        };

        metrics::gauge!("swarm_health_score").set(health_score as f64);
        metrics::gauge!("swarm_open_circuits").set(open_circuits as f64);

        self.notifier
            .push(serde_json::to_value(&snapshot).map_err(|e| {
                SwarmError::internal(format!("failed to serialize health snapshot: {e}"))
            })?)
            .await;

        Ok(snapshot)
    }

    /// Persist an alert unless one with the same level and subject is still
    /// unresolved.
    async fn raise(
        &self,
        level: AlertLevel,
        subject: &str,
        message: String,
    ) -> Result<(), SwarmError> {
        let unresolved = self.store.unresolved_alerts().await?;
        if unresolved
            .iter()
            .any(|a| a.level == level && a.subject == subject)
        {
            return Ok(());
        }

        warn!(?level, subject, %message, "raising alert");
        self.store
            .append_alert(Alert::new(level, subject, message))
            .await?;
        Ok(())
    }
}
