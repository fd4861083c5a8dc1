// Dispatcher - fetch-next-eligible with a single-winner claim

use crate::domain::Job;
use crate::error::Result;
use crate::port::{JobStore, TimeProvider};
use std::sync::Arc;
use tracing::debug;

/// Selects the next eligible Pending job for a worker.
///
/// Eligible means Pending with `next_run_at` unset or in the past; ties break
/// FIFO by `created_at`. The claim happens inside the fetch: the store marks
/// the job Running in the same critical section that selects it, so no two
/// workers can ever receive the same job id, at any worker count.
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    time_provider: Arc<dyn TimeProvider>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn JobStore>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            store,
            time_provider,
        }
    }

    /// Claim the next eligible job, or `None` when the queue is idle.
    ///
    /// Idle is not an error; callers back off briefly before polling again.
    pub async fn fetch_next(&self) -> Result<Option<Job>> {
        let now = self.time_provider.now_millis();
        let claimed = self.store.claim_next(now).await?;
        if let Some(job) = &claimed {
            debug!(job_id = %job.id, "claimed job for execution");
        }
        Ok(claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobState;
    use crate::port::job_store::mocks::MemoryJobStore;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use tokio::task::JoinSet;

    fn dispatcher_at(now_ms: i64) -> (Dispatcher, Arc<MemoryJobStore>) {
        let clock = Arc::new(FixedTimeProvider::new(now_ms));
        let store = Arc::new(MemoryJobStore::new(clock.clone()));
        (Dispatcher::new(store.clone(), clock), store)
    }

    #[tokio::test]
    async fn fetches_fifo_by_created_at() {
        let (dispatcher, store) = dispatcher_at(10_000);
        store
            .insert_or_replace_job(&Job::new("newer", "true", 3, 2000))
            .await
            .unwrap();
        store
            .insert_or_replace_job(&Job::new("older", "true", 3, 1000))
            .await
            .unwrap();

        assert_eq!(dispatcher.fetch_next().await.unwrap().unwrap().id, "older");
        assert_eq!(dispatcher.fetch_next().await.unwrap().unwrap().id, "newer");
        assert!(dispatcher.fetch_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn skips_jobs_backed_off_into_the_future() {
        let (dispatcher, store) = dispatcher_at(10_000);
        let mut job = Job::new("j1", "true", 3, 1000);
        job.next_run_at = Some(60_000);
        store.insert_or_replace_job(&job).await.unwrap();

        assert!(dispatcher.fetch_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_fetches_never_hand_out_the_same_job() {
        let clock = Arc::new(FixedTimeProvider::new(10_000));
        let store = Arc::new(MemoryJobStore::new(clock.clone()));
        for i in 0..20 {
            store
                .insert_or_replace_job(&Job::new(format!("job-{i}"), "true", 3, i))
                .await
                .unwrap();
        }

        let mut tasks = JoinSet::new();
        for _ in 0..8 {
            let dispatcher = Dispatcher::new(store.clone(), clock.clone());
            tasks.spawn(async move {
                let mut claimed = Vec::new();
                while let Some(job) = dispatcher.fetch_next().await.unwrap() {
                    claimed.push(job.id);
                }
                claimed
            });
        }

        let mut all = Vec::new();
        while let Some(result) = tasks.join_next().await {
            all.extend(result.unwrap());
        }

        all.sort();
        let before_dedup = all.len();
        all.dedup();
        assert_eq!(before_dedup, all.len(), "a job was dispatched twice");
        assert_eq!(all.len(), 20);
        assert_eq!(store.count_jobs(JobState::Running).await.unwrap(), 20);
    }
}
