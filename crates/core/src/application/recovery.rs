// Startup recovery for jobs orphaned in the Running state

use crate::domain::JobState;
use crate::error::Result;
use crate::port::JobStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Crash recovery
///
/// A process that dies mid-execution leaves its claimed jobs Running with no
/// worker attached. On startup, before any workers are spawned, those rows
/// are returned to Pending (attempts unchanged, backoff cleared) so they
/// become dispatchable again.
pub struct RecoveryService {
    store: Arc<dyn JobStore>,
}

impl RecoveryService {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Requeue every Running job; returns how many were recovered
    pub async fn requeue_orphaned(&self) -> Result<usize> {
        let orphaned = self.store.list_jobs(Some(JobState::Running)).await?;
        for job in &orphaned {
            warn!(
                job_id = %job.id,
                attempts = %job.attempts,
                "requeueing job left running by a previous process"
            );
            self.store
                .update_job_state(&job.id, JobState::Pending, None, None)
                .await?;
        }
        if !orphaned.is_empty() {
            info!(recovered = %orphaned.len(), "orphaned job recovery complete");
        }
        Ok(orphaned.len())
    }
}
