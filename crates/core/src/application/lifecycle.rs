// Job lifecycle - state machine, retry/backoff decisions, DLQ hand-off

use crate::domain::{base_backoff_seconds_from, Job, JobState, CONFIG_BASE_BACKOFF_SECONDS};
use crate::error::{AppError, Result};
use crate::port::{JobStore, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// Decision for a failed execution attempt
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue the job with a backoff delay
    Requeue { delay_ms: i64 },
    /// Retry budget exhausted, move to the DLQ
    DeadLetter,
}

/// Outcome of reporting a failure to the lifecycle manager
#[derive(Debug, PartialEq, Eq)]
pub enum FailureOutcome {
    Requeued { next_run_at: i64 },
    DeadLettered,
}

/// Cap on the backoff exponent so the shift cannot overflow
const MAX_BACKOFF_EXPONENT: i64 = 32;

/// Decide what happens after a failed attempt
///
/// `attempts_after` is the post-failure attempt count. The job dead-letters
/// when that count strictly exceeds `max_retries` (a job with max_retries=3
/// gets at most 4 execution attempts); otherwise the k-th failure waits
/// `base * 2^(k-1)` seconds.
pub fn decide(attempts_after: i64, max_retries: i64, base_backoff_secs: i64) -> RetryDecision {
    if attempts_after > max_retries {
        return RetryDecision::DeadLetter;
    }
    let exponent = (attempts_after - 1).clamp(0, MAX_BACKOFF_EXPONENT) as u32;
    let delay_secs = base_backoff_secs.saturating_mul(1i64 << exponent);
    RetryDecision::Requeue {
        delay_ms: delay_secs.saturating_mul(1000),
    }
}

/// Job Lifecycle Manager
///
/// The only writer of `state`, `attempts` and `next_run_at` after enqueue.
/// Holds no cached state across calls: every operation reads and writes
/// through the store so it stays correct under concurrent workers.
pub struct JobLifecycle {
    store: Arc<dyn JobStore>,
    time_provider: Arc<dyn TimeProvider>,
}

impl JobLifecycle {
    pub fn new(store: Arc<dyn JobStore>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            store,
            time_provider,
        }
    }

    /// Record a successful execution: Running -> Completed
    ///
    /// The successful try is counted too, so a job that succeeds first time
    /// finishes with `attempts == 1`.
    pub async fn complete(&self, job: &Job) -> Result<()> {
        let attempts_after = job.attempts + 1;
        self.store
            .update_job_state(&job.id, JobState::Completed, Some(attempts_after), None)
            .await?;
        info!(job_id = %job.id, attempts = %attempts_after, "job completed");
        Ok(())
    }

    /// Record a failed execution: Running -> Pending (backoff) or -> DLQ
    pub async fn fail(&self, job: &Job, diagnostic: &str) -> Result<FailureOutcome> {
        let attempts_after = job.attempts + 1;
        let base_backoff_secs = base_backoff_seconds_from(
            self.store.get_config(CONFIG_BASE_BACKOFF_SECONDS).await?,
        );
        let now = self.time_provider.now_millis();

        match decide(attempts_after, job.max_retries, base_backoff_secs) {
            RetryDecision::Requeue { delay_ms } => {
                let next_run_at = now + delay_ms;
                self.store
                    .update_job_state(
                        &job.id,
                        JobState::Pending,
                        Some(attempts_after),
                        Some(next_run_at),
                    )
                    .await?;
                warn!(
                    job_id = %job.id,
                    attempt = %attempts_after,
                    max_retries = %job.max_retries,
                    delay_ms = %delay_ms,
                    error = %diagnostic,
                    "job failed, retry scheduled"
                );
                Ok(FailureOutcome::Requeued { next_run_at })
            }
            RetryDecision::DeadLetter => {
                self.store
                    .move_to_dlq(job, attempts_after, diagnostic, now)
                    .await?;
                warn!(
                    job_id = %job.id,
                    attempts = %attempts_after,
                    max_retries = %job.max_retries,
                    error = %diagnostic,
                    "retry budget exhausted, job moved to DLQ"
                );
                Ok(FailureOutcome::DeadLettered)
            }
        }
    }

    /// Manual override: reset attempts to 0 and make the job immediately
    /// eligible, regardless of any pending backoff
    pub async fn retry_now(&self, id: &str) -> Result<()> {
        match self.store.get_job(id).await? {
            Some(_) => {
                self.store
                    .update_job_state(id, JobState::Pending, Some(0), None)
                    .await?;
                info!(job_id = %id, "job reset for immediate retry");
                Ok(())
            }
            None => Err(AppError::NotFound(format!("job {} not found", id))),
        }
    }

    /// Convert a DLQ entry back into a Pending job (attempts carried forward)
    pub async fn retry_from_dlq(&self, id: &str) -> Result<Job> {
        let now = self.time_provider.now_millis();
        match self.store.retry_from_dlq(id, now).await? {
            Some(job) => {
                info!(job_id = %id, attempts = %job.attempts, "job restored from DLQ");
                Ok(job)
            }
            None => Err(AppError::NotFound(format!("DLQ entry {} not found", id))),
        }
    }
}
