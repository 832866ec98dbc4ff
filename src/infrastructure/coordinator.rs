//! Batch coordination: fan-out, deadline racing, finalization, persistence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::domain::{
    BatchId, BatchQualityRecord, BatchReport, BatchStatus, CallFailure, CallOutcome, CallRecord,
    CallSpec, CallSuccess, ProviderKey, ProviderSet, QualityFlag, ResultStore, SwarmError,
    SynchronizationStatus,
};

use super::admission::AdmissionController;
use super::executor::CallExecutor;

/// Coordinates one work item's full set of provider calls.
///
/// Holds a single admission permit for the batch lifetime, fans out one
/// executor task per expected (provider, model, prompt) triple, and
/// finalizes on whichever comes first: all calls settled, or the batch
/// deadline. Provider failure is surfaced as report data; only persistence
/// failure makes `process_batch` return an error.
pub struct BatchCoordinator {
    admission: AdmissionController,
    executor: Arc<CallExecutor>,
    providers: Arc<ProviderSet>,
    store: Arc<dyn ResultStore>,
    batch_timeout: Duration,
    min_successful: usize,
    max_temporal_variance_ms: u64,
    slow_threshold_ms: u64,
}

impl std::fmt::Debug for BatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("batch_timeout", &self.batch_timeout)
            .field("min_successful", &self.min_successful)
            .finish()
    }
}

impl BatchCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        admission: AdmissionController,
        executor: Arc<CallExecutor>,
        providers: Arc<ProviderSet>,
        store: Arc<dyn ResultStore>,
        batch_timeout: Duration,
        min_successful: usize,
        max_temporal_variance_ms: u64,
        slow_threshold_ms: u64,
    ) -> Self {
        Self {
            admission,
            executor,
            providers,
            store,
            batch_timeout,
            min_successful,
            max_temporal_variance_ms,
            slow_threshold_ms,
        }
    }

    /// Process one work item against its expected call set.
    pub async fn process_batch(
        &self,
        work_item_id: &str,
        expected: Vec<CallSpec>,
    ) -> Result<BatchReport, SwarmError> {
        self.validate(&expected)?;

        let resolved: Vec<_> = expected
            .iter()
            .map(|spec| {
                self.providers
                    .get(&spec.key)
                    .cloned()
                    .ok_or_else(|| {
                        SwarmError::validation(format!("no provider configured for {}", spec.key))
                    })
                    .map(|provider| (spec.clone(), provider))
            })
            .collect::<Result<_, _>>()?;

        // One slot per work item; provider-call fan-out below is unbounded
        // within the batch.
        let permit = self.admission.acquire().await?;

        let batch_id = BatchId::derive(work_item_id, Utc::now());
        let start = Instant::now();
        let deadline = start + self.batch_timeout;

        info!(
            batch = %batch_id,
            calls = expected.len(),
            "processing batch"
        );

        let mut tasks: JoinSet<CallOutcome> = JoinSet::new();
        for (spec, provider) in resolved {
            let executor = self.executor.clone();
            let work_item = work_item_id.to_string();

            tasks.spawn(async move {
                executor.execute(provider, &spec, &work_item, deadline).await
            });
        }

        let mut completed: HashMap<ProviderKey, CallSuccess> = HashMap::new();
        let mut failed: HashMap<ProviderKey, CallFailure> = HashMap::new();

        let mut record = |outcome: CallOutcome| match outcome {
            CallOutcome::Success(success) => {
                completed.insert(success.key.clone(), success);
            }
            CallOutcome::Failure(failure) => {
                failed.insert(failure.key.clone(), failure);
            }
        };

        let deadline_hit = loop {
            tokio::select! {
                next = tasks.join_next() => match next {
                    None => break false,
                    Some(Ok(outcome)) => record(outcome),
                    Some(Err(join_error)) => {
                        if join_error.is_panic() {
                            error!(batch = %batch_id, %join_error, "call task panicked");
                        }
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(batch = %batch_id, "batch deadline elapsed, cancelling stragglers");
                    tasks.abort_all();
                    break true;
                }
            }
        };

        // Drain so no task outlives the batch; anything that managed to
        // settle before its abort landed still counts.
        while let Some(next) = tasks.join_next().await {
            if let Ok(outcome) = next {
                record(outcome);
            }
        }

        if deadline_hit {
            let now = Utc::now();
            for spec in &expected {
                if !completed.contains_key(&spec.key) && !failed.contains_key(&spec.key) {
                    failed.insert(
                        spec.key.clone(),
                        CallFailure {
                            key: spec.key.clone(),
                            prompt_kind: spec.prompt_kind.clone(),
                            error: "batch timeout".to_string(),
                            timestamp: now,
                            retry_count: 0,
                            is_final: true,
                        },
                    );
                }
            }
        }

        let report = self.finalize(batch_id, work_item_id, &expected, completed, failed, start);

        metrics::counter!("swarm_batches_total", "status" => report.status.as_str()).increment(1);
        metrics::histogram!("swarm_batch_temporal_variance_ms")
            .record(report.temporal_variance_ms as f64);

        // Release the work-item slot before the persistence round-trips.
        drop(permit);

        self.persist(&report).await?;

        info!(
            batch = %report.batch_id,
            status = report.status.as_str(),
            sync = report.synchronization_status.as_str(),
            successes = report.success_count(),
            failures = report.failures.len(),
            variance_ms = report.temporal_variance_ms,
            "batch finalized"
        );

        Ok(report)
    }

    fn validate(&self, expected: &[CallSpec]) -> Result<(), SwarmError> {
        if expected.is_empty() {
            return Err(SwarmError::validation("batch has no expected calls"));
        }

        let mut seen = std::collections::HashSet::new();
        for spec in expected {
            if !seen.insert(&spec.key) {
                return Err(SwarmError::validation(format!(
                    "duplicate provider {} in expected call set",
                    spec.key
                )));
            }
        }

        Ok(())
    }

    fn finalize(
        &self,
        batch_id: BatchId,
        work_item_id: &str,
        expected: &[CallSpec],
        completed: HashMap<ProviderKey, CallSuccess>,
        failed: HashMap<ProviderKey, CallFailure>,
        start: Instant,
    ) -> BatchReport {
        let success_count = completed.len();

        let status = if success_count >= self.min_successful {
            BatchStatus::Success
        } else if success_count > 0 {
            BatchStatus::Partial
        } else {
            BatchStatus::Failed
        };

        let temporal_variance_ms = temporal_variance_ms(completed.values());

        let synchronization_status = if status == BatchStatus::Success
            && temporal_variance_ms <= self.max_temporal_variance_ms
        {
            SynchronizationStatus::Synchronized
        } else if status != BatchStatus::Failed {
            SynchronizationStatus::Partial
        } else {
            SynchronizationStatus::Failed
        };

        BatchReport {
            batch_id,
            work_item_id: work_item_id.to_string(),
            status,
            synchronization_status,
            results: completed.into_values().collect(),
            failures: failed.into_values().collect(),
            expected_count: expected.len(),
            temporal_variance_ms,
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn persist(&self, report: &BatchReport) -> Result<(), SwarmError> {
        let incomplete = report.success_rate() < 0.8;
        let drifted = report.temporal_variance_ms > self.max_temporal_variance_ms;

        for success in &report.results {
            let flags = self.quality_flags(success, drifted, incomplete);
            self.store
                .append_call_result(CallRecord {
                    work_item_id: report.work_item_id.clone(),
                    key: success.key.clone(),
                    prompt_kind: success.prompt_kind.clone(),
                    content: success.content.clone(),
                    timestamp: success.timestamp,
                    response_time_ms: success.response_time_ms,
                    retry_count: success.retry_count,
                    quality_flags: QualityFlag::render(&flags),
                })
                .await?;
        }

        self.store
            .append_batch_quality(BatchQualityRecord {
                work_item_id: report.work_item_id.clone(),
                batch_id: report.batch_id.clone(),
                success_rate: report.success_rate(),
                temporal_variance_ms: report.temporal_variance_ms,
                avg_response_time_ms: report.avg_response_time_ms(),
                synchronization_status: report.synchronization_status,
                expected_count: report.expected_count,
                success_count: report.success_count(),
                failure_count: report.failures.len(),
                timestamp: Utc::now(),
            })
            .await
    }

    /// Additive per-call quality flags; a clean call is `high_quality`.
    fn quality_flags(
        &self,
        success: &CallSuccess,
        batch_drifted: bool,
        batch_incomplete: bool,
    ) -> Vec<QualityFlag> {
        let mut flags = Vec::new();

        if success.retry_count > 0 {
            flags.push(QualityFlag::Retried);
        }
        if success.response_time_ms > self.slow_threshold_ms {
            flags.push(QualityFlag::SlowResponse);
        }
        if batch_drifted {
            flags.push(QualityFlag::TemporalDrift);
        }
        if batch_incomplete {
            flags.push(QualityFlag::IncompleteBatch);
        }
        if flags.is_empty() {
            flags.push(QualityFlag::HighQuality);
        }

        flags
    }
}

/// Spread between the earliest and latest successful completion; 0 when the
/// batch has at most one success.
fn temporal_variance_ms<'a>(successes: impl Iterator<Item = &'a CallSuccess>) -> u64 {
    let mut min: Option<Instant> = None;
    let mut max: Option<Instant> = None;

    for success in successes {
        let at = success.completed_at;
        min = Some(min.map_or(at, |m| m.min(at)));
        max = Some(max.map_or(at, |m| m.max(at)));
    }

    match (min, max) {
        (Some(min), Some(max)) => (max - min).as_millis() as u64,
        _ => 0,
    }
}
