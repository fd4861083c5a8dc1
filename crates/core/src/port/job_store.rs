// Job Store Port (Interface)
//
// Durable, crash-tolerant persistence for the three collections (jobs, DLQ,
// config). Every compound read-then-write the engine needs (claim, move to
// DLQ, retry from DLQ, enqueue-overwrite) is a single store operation so that
// no caller can observe an intermediate state.

use crate::domain::{DeadLetterEntry, Job, JobState};
use crate::error::Result;
use async_trait::async_trait;

/// Store interface for job, DLQ and config persistence
///
/// Absence of a row is a normal `None`/`false` result, never an error.
/// Storage I/O failure surfaces as `AppError::Database` and is fatal for the
/// operation in progress; the engine does not retry storage faults.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a job, replacing any existing job row with the same id and
    /// removing any same-id DLQ entry in the same critical section
    /// (at most one row per id across jobs and DLQ combined).
    async fn insert_or_replace_job(&self, job: &Job) -> Result<()>;

    /// Find job by ID
    async fn get_job(&self, id: &str) -> Result<Option<Job>>;

    /// List jobs, optionally filtered by state, ordered by `created_at`
    async fn list_jobs(&self, state: Option<JobState>) -> Result<Vec<Job>>;

    /// Rewrite a job's state, optionally its attempt count, and its
    /// `next_run_at` (always written: `None` clears it). Stamps `updated_at`.
    /// No-op when the id is absent.
    async fn update_job_state(
        &self,
        id: &str,
        state: JobState,
        attempts: Option<i64>,
        next_run_at: Option<i64>,
    ) -> Result<()>;

    /// Delete a job; returns false when the id was absent
    async fn delete_job(&self, id: &str) -> Result<bool>;

    /// Count jobs in a given state
    async fn count_jobs(&self, state: JobState) -> Result<i64>;

    /// Claim the next eligible Pending job: oldest `created_at` with
    /// `next_run_at` unset or <= `now_ms`, atomically marked Running.
    ///
    /// The single-winner guarantee of the dispatcher rests entirely on this
    /// operation being one critical section.
    async fn claim_next(&self, now_ms: i64) -> Result<Option<Job>>;

    /// Move a job to the DLQ: insert the dead-letter row (carrying
    /// `final_attempts`) and delete the job row atomically
    async fn move_to_dlq(
        &self,
        job: &Job,
        final_attempts: i64,
        last_error: &str,
        failed_at: i64,
    ) -> Result<()>;

    /// Convert a DLQ entry back into a Pending job (attempts carried forward,
    /// `next_run_at` cleared) and delete the DLQ row atomically.
    /// Returns the restored job, or `None` when the id is not in the DLQ.
    async fn retry_from_dlq(&self, id: &str, now_ms: i64) -> Result<Option<Job>>;

    /// Insert or replace a DLQ entry
    async fn insert_or_replace_dlq(&self, entry: &DeadLetterEntry) -> Result<()>;

    /// Delete a DLQ entry; returns false when the id was absent
    async fn delete_dlq(&self, id: &str) -> Result<bool>;

    /// List DLQ entries ordered by `failed_at`
    async fn list_dlq(&self) -> Result<Vec<DeadLetterEntry>>;

    /// Count DLQ entries
    async fn count_dlq(&self) -> Result<i64>;

    /// Read a config value
    async fn get_config(&self, key: &str) -> Result<Option<String>>;

    /// Write a config value
    async fn set_config(&self, key: &str, value: &str) -> Result<()>;
}

// ============================================================================
// In-memory implementation for tests
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::{
        CONFIG_BASE_BACKOFF_SECONDS, CONFIG_MAX_RETRIES, DEFAULT_BASE_BACKOFF_SECONDS,
        DEFAULT_MAX_RETRIES,
    };
    use crate::port::time_provider::{SystemTimeProvider, TimeProvider};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MemoryState {
        jobs: HashMap<String, Job>,
        dlq: HashMap<String, DeadLetterEntry>,
        config: HashMap<String, String>,
    }

    /// In-memory JobStore
    ///
    /// A single mutex over all three collections: every operation is one
    /// critical section, which is the simplest discipline conforming to the
    /// store contract. Used by core unit tests and concurrency tests that
    /// don't need durability.
    pub struct MemoryJobStore {
        state: Mutex<MemoryState>,
        time_provider: Arc<dyn TimeProvider>,
    }

    impl MemoryJobStore {
        pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
            let mut config = HashMap::new();
            config.insert(CONFIG_MAX_RETRIES.to_string(), DEFAULT_MAX_RETRIES.to_string());
            config.insert(
                CONFIG_BASE_BACKOFF_SECONDS.to_string(),
                DEFAULT_BASE_BACKOFF_SECONDS.to_string(),
            );
            Self {
                state: Mutex::new(MemoryState {
                    config,
                    ..Default::default()
                }),
                time_provider,
            }
        }

        pub fn new_system_time() -> Self {
            Self::new(Arc::new(SystemTimeProvider))
        }
    }

    #[async_trait]
    impl JobStore for MemoryJobStore {
        async fn insert_or_replace_job(&self, job: &Job) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.dlq.remove(&job.id);
            state.jobs.insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn get_job(&self, id: &str) -> Result<Option<Job>> {
            Ok(self.state.lock().unwrap().jobs.get(id).cloned())
        }

        async fn list_jobs(&self, filter: Option<JobState>) -> Result<Vec<Job>> {
            let state = self.state.lock().unwrap();
            let mut jobs: Vec<Job> = state
                .jobs
                .values()
                .filter(|j| filter.map_or(true, |f| j.state == f))
                .cloned()
                .collect();
            jobs.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
            Ok(jobs)
        }

        async fn update_job_state(
            &self,
            id: &str,
            new_state: JobState,
            attempts: Option<i64>,
            next_run_at: Option<i64>,
        ) -> Result<()> {
            let now = self.time_provider.now_millis();
            let mut state = self.state.lock().unwrap();
            if let Some(job) = state.jobs.get_mut(id) {
                job.state = new_state;
                if let Some(a) = attempts {
                    job.attempts = a;
                }
                job.next_run_at = next_run_at;
                job.updated_at = now;
            }
            Ok(())
        }

        async fn delete_job(&self, id: &str) -> Result<bool> {
            Ok(self.state.lock().unwrap().jobs.remove(id).is_some())
        }

        async fn count_jobs(&self, filter: JobState) -> Result<i64> {
            let state = self.state.lock().unwrap();
            Ok(state.jobs.values().filter(|j| j.state == filter).count() as i64)
        }

        async fn claim_next(&self, now_ms: i64) -> Result<Option<Job>> {
            let mut state = self.state.lock().unwrap();
            let next_id = state
                .jobs
                .values()
                .filter(|j| j.is_eligible(now_ms))
                .min_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)))
                .map(|j| j.id.clone());

            match next_id {
                Some(id) => {
                    let job = state.jobs.get_mut(&id).unwrap();
                    job.state = JobState::Running;
                    job.updated_at = now_ms;
                    Ok(Some(job.clone()))
                }
                None => Ok(None),
            }
        }

        async fn move_to_dlq(
            &self,
            job: &Job,
            final_attempts: i64,
            last_error: &str,
            failed_at: i64,
        ) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.jobs.remove(&job.id);
            state.dlq.insert(
                job.id.clone(),
                DeadLetterEntry {
                    id: job.id.clone(),
                    command: job.command.clone(),
                    attempts: final_attempts,
                    max_retries: job.max_retries,
                    failed_at,
                    last_error: last_error.to_string(),
                },
            );
            Ok(())
        }

        async fn retry_from_dlq(&self, id: &str, now_ms: i64) -> Result<Option<Job>> {
            let mut state = self.state.lock().unwrap();
            let entry = match state.dlq.remove(id) {
                Some(e) => e,
                None => return Ok(None),
            };
            let mut job = Job::new(&entry.id, &entry.command, entry.max_retries, now_ms);
            job.attempts = entry.attempts;
            state.jobs.insert(job.id.clone(), job.clone());
            Ok(Some(job))
        }

        async fn insert_or_replace_dlq(&self, entry: &DeadLetterEntry) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.dlq.insert(entry.id.clone(), entry.clone());
            Ok(())
        }

        async fn delete_dlq(&self, id: &str) -> Result<bool> {
            Ok(self.state.lock().unwrap().dlq.remove(id).is_some())
        }

        async fn list_dlq(&self) -> Result<Vec<DeadLetterEntry>> {
            let state = self.state.lock().unwrap();
            let mut entries: Vec<DeadLetterEntry> = state.dlq.values().cloned().collect();
            entries.sort_by(|a, b| (a.failed_at, &a.id).cmp(&(b.failed_at, &b.id)));
            Ok(entries)
        }

        async fn count_dlq(&self) -> Result<i64> {
            Ok(self.state.lock().unwrap().dlq.len() as i64)
        }

        async fn get_config(&self, key: &str) -> Result<Option<String>> {
            Ok(self.state.lock().unwrap().config.get(key).cloned())
        }

        async fn set_config(&self, key: &str, value: &str) -> Result<()> {
            self.state
                .lock()
                .unwrap()
                .config
                .insert(key.to_string(), value.to_string());
            Ok(())
        }
    }
}
