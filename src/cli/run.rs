//! Run command - processes domains through the provider swarm.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::domain::{CallSpec, NullNotifier, Notifier, PromptTemplate};
use crate::infrastructure::llm::providers_from_env;
use crate::infrastructure::logging;
use crate::infrastructure::notification::WebhookNotifier;
use crate::infrastructure::storage::InMemoryResultStore;
use crate::orchestrator::Orchestrator;

#[derive(Args)]
pub struct RunArgs {
    /// Domains to process
    pub domains: Vec<String>,

    /// Read domains from a file, one per line
    #[arg(long, value_name = "PATH")]
    pub domains_file: Option<PathBuf>,
}

/// The three analysis angles dispatched per domain. Each kind runs as its
/// own batch so the synchronization verdict compares like with like.
pub fn prompt_templates() -> Vec<PromptTemplate> {
    vec![
        PromptTemplate::new(
            "business_analysis",
            "Analyze this company from a business perspective: {domain}. What is \
             their core business model, target market, competitive advantages, and \
             strategic positioning? Provide specific insights about their \
             operations, revenue streams, and market presence.",
        ),
        PromptTemplate::new(
            "content_strategy",
            "Evaluate the content strategy and digital presence of {domain}. How do \
             they communicate with their audience, what is their brand voice, and \
             how effective is their marketing approach? Analyze their content \
             quality and engagement strategies.",
        ),
        PromptTemplate::new(
            "technical_assessment",
            "Assess the technical capabilities and innovation profile of {domain}. \
             What technologies do they use, what is their technical expertise, and \
             how do they approach innovation? Analyze their technical strengths and \
             digital infrastructure.",
        ),
    ]
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    logging::init_logging(&config.logging);

    let domains = collect_domains(&args)?;
    if domains.is_empty() {
        anyhow::bail!("no domains to process; pass them as arguments or via --domains-file");
    }

    let providers = providers_from_env().context("failed to configure providers")?;
    let store = Arc::new(InMemoryResultStore::new());
    let notifier: Arc<dyn Notifier> = if config.notification.endpoints.is_empty() {
        Arc::new(NullNotifier)
    } else {
        Arc::new(WebhookNotifier::new(&config.notification))
    };

    let orchestrator = Arc::new(Orchestrator::new(
        &config,
        providers.clone(),
        store.clone(),
        notifier,
    ));
    orchestrator.start();

    let templates = prompt_templates();
    let keys: Vec<_> = providers.keys().cloned().collect();

    info!(
        domains = domains.len(),
        providers = keys.len(),
        "starting swarm run"
    );

    for chunk in domains.chunks(config.orchestrator.batch_size) {
        let mut batches = Vec::new();

        for domain in chunk {
            for template in &templates {
                let expected: Vec<CallSpec> = keys
                    .iter()
                    .map(|key| {
                        CallSpec::new(key.clone(), &template.kind, template.render(domain))
                    })
                    .collect();

                let orchestrator = orchestrator.clone();
                let domain = domain.clone();
                batches.push(tokio::spawn(async move {
                    orchestrator.process_batch(&domain, expected).await
                }));
            }
        }

        for handle in batches {
            match handle.await {
                Ok(Ok(report)) => {
                    info!(
                        batch = %report.batch_id,
                        status = report.status.as_str(),
                        successes = report.success_count(),
                        expected = report.expected_count,
                        sync = report.synchronization_status.as_str(),
                        "batch complete"
                    );
                }
                Ok(Err(error)) => warn!(%error, "batch failed"),
                Err(join_error) => warn!(%join_error, "batch task panicked"),
            }
        }
    }

    let snapshot = orchestrator.monitor_once().await?;
    info!(
        health_score = snapshot.health_score,
        batches = snapshot.batches_observed,
        "run complete"
    );

    orchestrator.shutdown();
    Ok(())
}

fn collect_domains(args: &RunArgs) -> anyhow::Result<Vec<String>> {
    let mut domains = args.domains.clone();

    if let Some(path) = &args.domains_file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        domains.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from),
        );
    }

    // first occurrence wins, regardless of which source it came from
    let mut seen = std::collections::HashSet::new();
    domains.retain(|domain| seen.insert(domain.clone()));
    Ok(domains)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_cover_the_three_analysis_kinds() {
        let templates = prompt_templates();
        let kinds: Vec<_> = templates.iter().map(|t| t.kind.as_str()).collect();
        assert_eq!(
            kinds,
            ["business_analysis", "content_strategy", "technical_assessment"]
        );
        for template in &templates {
            assert!(template.text.contains("{domain}"));
        }
    }

    #[test]
    fn domains_file_lines_are_trimmed_and_comments_skipped() {
        let dir = std::env::temp_dir().join("swarm-run-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("domains.txt");
        std::fs::write(&path, "example.com\n# comment\n  spaced.io  \n\n").unwrap();

        let args = RunArgs {
            domains: vec!["first.dev".to_string()],
            domains_file: Some(path),
        };

        let domains = collect_domains(&args).unwrap();
        assert_eq!(domains, ["first.dev", "example.com", "spaced.io"]);
    }

    #[test]
    fn duplicate_domains_collapse_across_args_and_file() {
        let dir = std::env::temp_dir().join("swarm-run-dedup-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("domains.txt");
        std::fs::write(&path, "example.com\nother.net\n").unwrap();

        let args = RunArgs {
            domains: vec![
                "example.com".to_string(),
                "unique.org".to_string(),
                "example.com".to_string(),
            ],
            domains_file: Some(path),
        };

        let domains = collect_domains(&args).unwrap();
        assert_eq!(domains, ["example.com", "unique.org", "other.net"]);
    }
}
