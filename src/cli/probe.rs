//! Probe command - one health round against every configured provider.

use std::sync::Arc;

use anyhow::Context;

use crate::config::AppConfig;
use crate::domain::NullNotifier;
use crate::infrastructure::llm::providers_from_env;
use crate::infrastructure::logging;
use crate::infrastructure::storage::InMemoryResultStore;
use crate::orchestrator::Orchestrator;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    logging::init_logging(&config.logging);

    let providers = providers_from_env().context("failed to configure providers")?;
    let store = Arc::new(InMemoryResultStore::new());
    let orchestrator = Orchestrator::new(&config, providers, store, Arc::new(NullNotifier));

    let healthy = orchestrator.probe_once().await?;

    let mut health = orchestrator.provider_health();
    health.sort_by(|a, b| a.key.to_string().cmp(&b.key.to_string()));

    println!("{:<45} {:>8} {:>10} {:>10}", "provider", "healthy", "avg ms", "failures");
    for provider in &health {
        println!(
            "{:<45} {:>8} {:>10.0} {:>10}",
            provider.key.to_string(),
            if provider.is_healthy { "yes" } else { "no" },
            provider.avg_response_time_ms,
            provider.total_failures,
        );
    }
    println!("\n{healthy}/{} providers healthy", health.len());

    Ok(())
}
