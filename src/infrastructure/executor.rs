//! Single provider call execution: timeout, retry, backoff, registry updates.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use crate::domain::{CallFailure, CallOutcome, CallSpec, CallSuccess, LlmProvider, SwarmError};

use super::registry::ProviderHealthRegistry;

/// Executes one provider call with bounded retries under a caller deadline.
///
/// The registry is consulted before dispatch (an open circuit yields an
/// immediate final failure without touching the provider) and updated once
/// per exhausted call: on success, or once when retries or the deadline run
/// out. Per-attempt failures are not individually recorded.
pub struct CallExecutor {
    registry: Arc<ProviderHealthRegistry>,
    max_retries: u32,
    per_call_timeout: Duration,
    backoff_base: Duration,
    max_backoff: Duration,
}

impl std::fmt::Debug for CallExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallExecutor")
            .field("max_retries", &self.max_retries)
            .field("per_call_timeout", &self.per_call_timeout)
            .finish()
    }
}

impl CallExecutor {
    pub fn new(
        registry: Arc<ProviderHealthRegistry>,
        max_retries: u32,
        per_call_timeout: Duration,
        backoff_base: Duration,
        max_backoff: Duration,
    ) -> Self {
        Self {
            registry,
            max_retries: max_retries.max(1),
            per_call_timeout,
            backoff_base,
            max_backoff,
        }
    }

    /// Run the call to completion. The `deadline` bounds the entire
    /// operation including backoff sleeps; reaching it abandons remaining
    /// retries for this call only.
    pub async fn execute(
        &self,
        provider: Arc<dyn LlmProvider>,
        spec: &CallSpec,
        work_item_id: &str,
        deadline: Instant,
    ) -> CallOutcome {
        if !self.registry.is_dispatchable(&spec.key) {
            debug!(provider = %spec.key, "skipping call, circuit open");
            metrics::counter!("swarm_calls_skipped", "provider" => spec.key.to_string())
                .increment(1);

            // A skip, not an attempt: the registry failure streak is left alone.
            return self.failure(spec, "circuit open", 0);
        }

        let mut last_error = "no attempt made".to_string();

        for attempt in 1..=self.max_retries {
            let now = Instant::now();
            if now >= deadline {
                return self.exhausted(spec, "deadline exceeded", attempt - 1);
            }

            let attempt_timeout = self.per_call_timeout.min(deadline - now);
            let started = Instant::now();
            let result = timeout(
                attempt_timeout,
                provider.invoke(spec.key.model(), &spec.prompt, work_item_id),
            )
            .await;

            match result {
                Ok(Ok(content)) => {
                    let response_time_ms = started.elapsed().as_millis() as u64;
                    self.registry.record_success(&spec.key, response_time_ms);

                    return CallOutcome::Success(CallSuccess {
                        key: spec.key.clone(),
                        prompt_kind: spec.prompt_kind.clone(),
                        content,
                        timestamp: Utc::now(),
                        completed_at: Instant::now(),
                        response_time_ms,
                        retry_count: attempt - 1,
                    });
                }
                Ok(Err(error)) if !error.is_retryable() => {
                    warn!(provider = %spec.key, %error, "non-retryable provider error");
                    return self.exhausted(spec, &error.to_string(), attempt - 1);
                }
                Ok(Err(error)) => {
                    last_error = error.to_string();
                }
                Err(_) => {
                    last_error = SwarmError::call_timeout(
                        spec.key.provider(),
                        attempt_timeout.as_millis() as u64,
                    )
                    .to_string();
                }
            }

            debug!(
                provider = %spec.key,
                attempt,
                max = self.max_retries,
                error = %last_error,
                "call attempt failed"
            );
            metrics::counter!("swarm_call_retries", "provider" => spec.key.to_string())
                .increment(1);

            if attempt < self.max_retries {
                let backoff = self.backoff_delay(attempt);
                let now = Instant::now();
                if now >= deadline {
                    return self.exhausted(spec, "deadline exceeded", attempt);
                }
                tokio::time::sleep(backoff.min(deadline - now)).await;
            }
        }

        self.exhausted(spec, &last_error, self.max_retries - 1)
    }

    /// `min(backoff_base * 2^(retry - 1), max_backoff)` for the retry that
    /// follows attempt number `attempt`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let delay = self
            .backoff_base
            .saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.max_backoff)
    }

    /// Final failure after retries (or the deadline) ran out; recorded in
    /// the registry exactly once.
    fn exhausted(&self, spec: &CallSpec, error: &str, retry_count: u32) -> CallOutcome {
        self.registry.record_failure(&spec.key, error);
        self.failure(spec, error, retry_count)
    }

    fn failure(&self, spec: &CallSpec, error: &str, retry_count: u32) -> CallOutcome {
        CallOutcome::Failure(CallFailure {
            key: spec.key.clone(),
            prompt_kind: spec.prompt_kind.clone(),
            error: error.to_string(),
            timestamp: Utc::now(),
            retry_count,
            is_final: true,
        })
    }
}
