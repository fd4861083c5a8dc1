// Queue Service - the engine facade exposed to external collaborators

use crate::application::lifecycle::JobLifecycle;
use crate::application::worker::{shutdown_channel, Worker, WorkerPool};
use crate::domain::{max_retries_from, DeadLetterEntry, Job, JobState, CONFIG_MAX_RETRIES};
use crate::error::{AppError, Result};
use crate::port::{CommandRunner, IdProvider, JobStore, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Enqueue request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    /// Caller-supplied id; generated when absent. Re-using an id replaces the
    /// existing job or DLQ entry (explicit overwrite).
    #[serde(default)]
    pub id: Option<String>,

    /// Shell command to execute (opaque to the engine)
    pub command: String,

    /// Per-job retry ceiling; taken from config when absent
    #[serde(default)]
    pub max_retries: Option<i64>,
}

/// Aggregate queue counts for status views
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub dead_lettered: i64,
}

/// The queue engine
///
/// Front-ends call these operations and render results; nothing else reaches
/// into the store directly.
pub struct QueueService {
    store: Arc<dyn JobStore>,
    runner: Arc<dyn CommandRunner>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    lifecycle: JobLifecycle,
}

impl QueueService {
    pub fn new(
        store: Arc<dyn JobStore>,
        runner: Arc<dyn CommandRunner>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        let lifecycle = JobLifecycle::new(Arc::clone(&store), Arc::clone(&time_provider));
        Self {
            store,
            runner,
            id_provider,
            time_provider,
            lifecycle,
        }
    }

    /// Enqueue a new Pending job and return its id
    pub async fn enqueue(&self, req: EnqueueRequest) -> Result<String> {
        if req.command.trim().is_empty() {
            return Err(AppError::Validation(
                "job command must not be empty".to_string(),
            ));
        }
        if let Some(max_retries) = req.max_retries {
            if max_retries < 0 {
                return Err(AppError::Validation(
                    "max_retries must be non-negative".to_string(),
                ));
            }
        }

        let max_retries = match req.max_retries {
            Some(v) => v,
            None => max_retries_from(self.store.get_config(CONFIG_MAX_RETRIES).await?),
        };

        let id = req
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| self.id_provider.generate_id());
        let now = self.time_provider.now_millis();

        let job = Job::new(&id, &req.command, max_retries, now);
        self.store.insert_or_replace_job(&job).await?;

        info!(job_id = %id, max_retries = %max_retries, "job enqueued");
        Ok(id)
    }

    /// List jobs ordered by `created_at`, optionally filtered by state
    pub async fn list_jobs(&self, state: Option<JobState>) -> Result<Vec<Job>> {
        self.store.list_jobs(state).await
    }

    /// Fetch a single job snapshot
    pub async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        self.store.get_job(id).await
    }

    /// Reset a job for immediate retry (attempts back to 0)
    pub async fn retry_now(&self, id: &str) -> Result<()> {
        self.lifecycle.retry_now(id).await
    }

    /// Delete a job; returns false when the id was absent (idempotent)
    pub async fn delete_job(&self, id: &str) -> Result<bool> {
        let deleted = self.store.delete_job(id).await?;
        if deleted {
            info!(job_id = %id, "job deleted");
        }
        Ok(deleted)
    }

    /// List DLQ entries ordered by `failed_at`
    pub async fn list_dlq(&self) -> Result<Vec<DeadLetterEntry>> {
        self.store.list_dlq().await
    }

    /// Move a DLQ entry back to the pending queue (attempts carried forward)
    pub async fn retry_from_dlq(&self, id: &str) -> Result<()> {
        self.lifecycle.retry_from_dlq(id).await.map(|_| ())
    }

    /// Remove a DLQ entry permanently; returns false when absent
    pub async fn purge_dlq(&self, id: &str) -> Result<bool> {
        let purged = self.store.delete_dlq(id).await?;
        if purged {
            info!(job_id = %id, "DLQ entry purged");
        }
        Ok(purged)
    }

    /// Read a config value
    pub async fn get_config(&self, key: &str) -> Result<Option<String>> {
        self.store.get_config(key).await
    }

    /// Write a config value
    pub async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.store.set_config(key, value).await?;
        info!(key = %key, value = %value, "config updated");
        Ok(())
    }

    /// Aggregate counts across jobs and the DLQ
    pub async fn stats(&self) -> Result<QueueStats> {
        Ok(QueueStats {
            pending: self.store.count_jobs(JobState::Pending).await?,
            running: self.store.count_jobs(JobState::Running).await?,
            completed: self.store.count_jobs(JobState::Completed).await?,
            dead_lettered: self.store.count_dlq().await?,
        })
    }

    /// Spawn `count` independent worker loops and return their pool handle
    pub fn start_workers(&self, count: usize) -> WorkerPool {
        let mut pool = WorkerPool::new();
        for i in 1..=count {
            let name = format!("worker-{i}");
            let worker = Worker::new(
                name.clone(),
                Arc::clone(&self.store),
                Arc::clone(&self.runner),
                Arc::clone(&self.time_provider),
            );
            let (tx, token) = shutdown_channel();
            let handle = tokio::spawn(async move {
                if let Err(e) = worker.run(token).await {
                    error!(worker = %worker.name(), error = %e, "worker loop failed");
                }
            });
            pool.push(name, tx, handle);
        }
        info!(count = %count, "worker pool started");
        pool
    }

    /// Gracefully stop a pool: signal every member, then wait for the loops
    pub async fn stop_workers(&self, pool: WorkerPool) {
        let count = pool.len();
        pool.shutdown().await;
        info!(count = %count, "worker pool stopped");
    }
}
