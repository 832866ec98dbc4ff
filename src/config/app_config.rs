use std::time::Duration;

use serde::Deserialize;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub orchestrator: OrchestratorConfig,
    pub monitoring: MonitoringConfig,
    pub notification: NotificationConfig,
    pub logging: LoggingConfig,
}

/// Execution and resilience knobs for the orchestration core.
///
/// Every option carries the documented default; environment overrides use
/// the `SWARM__ORCHESTRATOR__*` form.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Work items processed concurrently system-wide.
    pub parallel_workers: usize,
    /// Work items pulled per outer loop pass.
    pub batch_size: usize,
    /// Per-call attempt timeout.
    pub llm_timeout_ms: u64,
    /// Deadline for a whole batch, including retries.
    pub batch_timeout_ms: u64,
    /// Attempts per provider call, including the first.
    pub max_retries_per_llm: u32,
    pub backoff_base_ms: u64,
    pub max_backoff_ms: u64,
    /// Successes required for a batch to count as `success`.
    pub min_successful_llms: usize,
    /// Allowed spread between earliest and latest success.
    pub max_temporal_variance_ms: u64,
    /// Consecutive failures that open a provider's circuit.
    pub circuit_breaker_threshold: u32,
    /// Cooldown before an open circuit admits a trial call.
    pub circuit_breaker_timeout_ms: u64,
    pub health_check_interval_ms: u64,
    pub provider_health_timeout_ms: u64,
    /// Responses slower than this are flagged `slow_response`.
    pub slow_response_threshold_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parallel_workers: 50,
            batch_size: 200,
            llm_timeout_ms: 120_000,
            batch_timeout_ms: 900_000,
            max_retries_per_llm: 3,
            backoff_base_ms: 1_000,
            max_backoff_ms: 30_000,
            min_successful_llms: 8,
            max_temporal_variance_ms: 300_000,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout_ms: 300_000,
            health_check_interval_ms: 60_000,
            provider_health_timeout_ms: 10_000,
            slow_response_threshold_ms: 30_000,
        }
    }
}

impl OrchestratorConfig {
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn circuit_breaker_timeout(&self) -> Duration {
        Duration::from_millis(self.circuit_breaker_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn provider_health_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_health_timeout_ms)
    }
}

/// Monitoring aggregator schedule and alerting thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub interval_ms: u64,
    /// Rolling window of batch quality records consulted per tick.
    pub window_ms: u64,
    pub success_rate_warning: f64,
    pub success_rate_critical: f64,
    pub variance_warning_ms: u64,
    pub variance_critical_ms: u64,
    pub response_time_warning_ms: f64,
    pub response_time_critical_ms: f64,
    pub max_unhealthy_providers: usize,
    pub max_open_circuits: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            interval_ms: 300_000,
            window_ms: 86_400_000,
            success_rate_warning: 0.80,
            success_rate_critical: 0.60,
            variance_warning_ms: 150_000,
            variance_critical_ms: 300_000,
            response_time_warning_ms: 30_000.0,
            response_time_critical_ms: 60_000.0,
            max_unhealthy_providers: 2,
            max_open_circuits: 1,
        }
    }
}

impl MonitoringConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// External notification endpoints (webhook URLs).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("SWARM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orchestrator_defaults_match_documented_values() {
        let config = OrchestratorConfig::default();

        assert_eq!(config.parallel_workers, 50);
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.llm_timeout_ms, 120_000);
        assert_eq!(config.batch_timeout_ms, 900_000);
        assert_eq!(config.max_retries_per_llm, 3);
        assert_eq!(config.backoff_base_ms, 1_000);
        assert_eq!(config.max_backoff_ms, 30_000);
        assert_eq!(config.min_successful_llms, 8);
        assert_eq!(config.max_temporal_variance_ms, 300_000);
        assert_eq!(config.circuit_breaker_threshold, 5);
        assert_eq!(config.circuit_breaker_timeout_ms, 300_000);
        assert_eq!(config.health_check_interval_ms, 60_000);
        assert_eq!(config.provider_health_timeout_ms, 10_000);
    }

    #[test]
    fn app_config_deserializes_partial_input() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "orchestrator": { "parallel_workers": 8, "min_successful_llms": 3 },
        }))
        .unwrap();

        assert_eq!(config.orchestrator.parallel_workers, 8);
        assert_eq!(config.orchestrator.min_successful_llms, 3);
        // untouched fields keep their defaults
        assert_eq!(config.orchestrator.batch_size, 200);
        assert_eq!(config.monitoring.window_ms, 86_400_000);
    }
}
