// SQLite JobStore Implementation

use async_trait::async_trait;
use queuectl_core::domain::{DeadLetterEntry, Job, JobState};
use queuectl_core::error::{AppError, Result};
use queuectl_core::port::{JobStore, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;

// Helper to convert sqlx::Error to AppError with structured information
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => AppError::Database(format!(
                        "Unique constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" => AppError::Database(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        _ => AppError::Database(err.to_string()),
    }
}

pub struct SqliteJobStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert_or_replace_job(&self, job: &Job) -> Result<()> {
        // One transaction keeps the jobs/DLQ uniqueness invariant: an id can
        // live in at most one of the two collections
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM dlq WHERE id = ?")
            .bind(&job.id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO jobs (
                id, command, state, attempts, max_retries,
                created_at, updated_at, next_run_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.command)
        .bind(job.state.to_string())
        .bind(job.attempts)
        .bind(job.max_retries)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.next_run_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::try_into_job).transpose()
    }

    async fn list_jobs(&self, state: Option<JobState>) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = match state {
            Some(state) => {
                sqlx::query_as(
                    "SELECT * FROM jobs WHERE state = ? ORDER BY created_at ASC, id ASC",
                )
                .bind(state.to_string())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as("SELECT * FROM jobs ORDER BY created_at ASC, id ASC")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::try_into_job).collect()
    }

    async fn update_job_state(
        &self,
        id: &str,
        state: JobState,
        attempts: Option<i64>,
        next_run_at: Option<i64>,
    ) -> Result<()> {
        // next_run_at is always rewritten (NULL clears it); attempts only
        // when given
        sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?,
                attempts = COALESCE(?, attempts),
                next_run_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(state.to_string())
        .bind(attempts)
        .bind(next_run_at)
        .bind(self.time_provider.now_millis())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_job(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_jobs(&self, state: JobState) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE state = ?")
            .bind(state.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(count)
    }

    async fn claim_next(&self, now_ms: i64) -> Result<Option<Job>> {
        // Single-winner claim: selecting the oldest eligible Pending job and
        // marking it Running is one statement, so concurrent workers can
        // never claim the same row
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET state = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM jobs
                WHERE state = ? AND (next_run_at IS NULL OR next_run_at <= ?)
                ORDER BY created_at ASC, id ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(JobState::Running.to_string())
        .bind(now_ms)
        .bind(JobState::Pending.to_string())
        .bind(now_ms)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::try_into_job).transpose()
    }

    async fn move_to_dlq(
        &self,
        job: &Job,
        final_attempts: i64,
        last_error: &str,
        failed_at: i64,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO dlq (id, command, attempts, max_retries, failed_at, last_error)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.command)
        .bind(final_attempts)
        .bind(job.max_retries)
        .bind(failed_at)
        .bind(last_error)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(&job.id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn retry_from_dlq(&self, id: &str, now_ms: i64) -> Result<Option<Job>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let entry = sqlx::query_as::<_, DlqRow>("SELECT * FROM dlq WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let entry = match entry {
            Some(e) => e,
            None => return Ok(None),
        };

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO jobs (
                id, command, state, attempts, max_retries,
                created_at, updated_at, next_run_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.command)
        .bind(JobState::Pending.to_string())
        .bind(entry.attempts)
        .bind(entry.max_retries)
        .bind(now_ms)
        .bind(now_ms)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM dlq WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        let mut job = Job::new(&entry.id, &entry.command, entry.max_retries, now_ms);
        job.attempts = entry.attempts;
        Ok(Some(job))
    }

    async fn insert_or_replace_dlq(&self, entry: &DeadLetterEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO dlq (id, command, attempts, max_retries, failed_at, last_error)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.command)
        .bind(entry.attempts)
        .bind(entry.max_retries)
        .bind(entry.failed_at)
        .bind(&entry.last_error)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_dlq(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM dlq WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_dlq(&self) -> Result<Vec<DeadLetterEntry>> {
        let rows: Vec<DlqRow> =
            sqlx::query_as("SELECT * FROM dlq ORDER BY failed_at ASC, id ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(DlqRow::into_entry).collect())
    }

    async fn count_dlq(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dlq")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(count)
    }

    async fn get_config(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(value)
    }

    async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("REPLACE INTO config(key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}

/// SQLite row representation of a job
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    command: String,
    state: String,
    attempts: i64,
    max_retries: i64,
    created_at: i64,
    updated_at: i64,
    next_run_at: Option<i64>,
}

impl JobRow {
    fn try_into_job(self) -> Result<Job> {
        let state: JobState = self.state.parse().map_err(AppError::Domain)?;
        Ok(Job {
            id: self.id,
            command: self.command,
            state,
            attempts: self.attempts,
            max_retries: self.max_retries,
            created_at: self.created_at,
            updated_at: self.updated_at,
            next_run_at: self.next_run_at,
        })
    }
}

/// SQLite row representation of a DLQ entry
#[derive(Debug, sqlx::FromRow)]
struct DlqRow {
    id: String,
    command: String,
    attempts: i64,
    max_retries: i64,
    failed_at: i64,
    last_error: String,
}

impl DlqRow {
    fn into_entry(self) -> DeadLetterEntry {
        DeadLetterEntry {
            id: self.id,
            command: self.command,
            attempts: self.attempts,
            max_retries: self.max_retries,
            failed_at: self.failed_at,
            last_error: self.last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use queuectl_core::port::time_provider::SystemTimeProvider;

    async fn setup_test_store() -> SqliteJobStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteJobStore::new(pool, Arc::new(SystemTimeProvider))
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = setup_test_store().await;
        let job = Job::new("j1", "echo hello", 3, 1000);
        store.insert_or_replace_job(&job).await.unwrap();

        let found = store.get_job("j1").await.unwrap().unwrap();
        assert_eq!(found.id, "j1");
        assert_eq!(found.command, "echo hello");
        assert_eq!(found.state, JobState::Pending);
        assert_eq!(found.attempts, 0);
        assert_eq!(found.next_run_at, None);

        assert!(store.get_job("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_next_orders_fifo_and_skips_backoff() {
        let store = setup_test_store().await;
        store
            .insert_or_replace_job(&Job::new("second", "true", 3, 2000))
            .await
            .unwrap();
        store
            .insert_or_replace_job(&Job::new("first", "true", 3, 1000))
            .await
            .unwrap();
        let mut backed_off = Job::new("later", "true", 3, 500);
        backed_off.next_run_at = Some(9_000);
        store.insert_or_replace_job(&backed_off).await.unwrap();

        let claimed = store.claim_next(5_000).await.unwrap().unwrap();
        assert_eq!(claimed.id, "first");
        assert_eq!(claimed.state, JobState::Running);

        let claimed = store.claim_next(5_000).await.unwrap().unwrap();
        assert_eq!(claimed.id, "second");

        // "later" is still backed off
        assert!(store.claim_next(5_000).await.unwrap().is_none());
        assert_eq!(store.claim_next(9_000).await.unwrap().unwrap().id, "later");
    }

    #[tokio::test]
    async fn test_update_job_state_rewrites_next_run_at() {
        let store = setup_test_store().await;
        store
            .insert_or_replace_job(&Job::new("j1", "true", 3, 1000))
            .await
            .unwrap();

        store
            .update_job_state("j1", JobState::Pending, Some(2), Some(8_000))
            .await
            .unwrap();
        let job = store.get_job("j1").await.unwrap().unwrap();
        assert_eq!(job.attempts, 2);
        assert_eq!(job.next_run_at, Some(8_000));

        // attempts kept when None, next_run_at cleared by None
        store
            .update_job_state("j1", JobState::Pending, None, None)
            .await
            .unwrap();
        let job = store.get_job("j1").await.unwrap().unwrap();
        assert_eq!(job.attempts, 2);
        assert_eq!(job.next_run_at, None);

        // absent id is a silent no-op
        store
            .update_job_state("ghost", JobState::Completed, Some(1), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_move_to_dlq_and_retry_back() {
        let store = setup_test_store().await;
        let job = Job::new("j1", "false", 1, 1000);
        store.insert_or_replace_job(&job).await.unwrap();

        store.move_to_dlq(&job, 2, "exit 1: boom", 7_000).await.unwrap();
        assert!(store.get_job("j1").await.unwrap().is_none());

        let dlq = store.list_dlq().await.unwrap();
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].attempts, 2);
        assert_eq!(dlq[0].failed_at, 7_000);
        assert_eq!(dlq[0].last_error, "exit 1: boom");

        let restored = store.retry_from_dlq("j1", 8_000).await.unwrap().unwrap();
        assert_eq!(restored.state, JobState::Pending);
        assert_eq!(restored.attempts, 2);
        assert_eq!(restored.next_run_at, None);
        assert_eq!(store.count_dlq().await.unwrap(), 0);

        let job = store.get_job("j1").await.unwrap().unwrap();
        assert_eq!(job.attempts, 2);
        assert_eq!(job.created_at, 8_000);
    }

    #[tokio::test]
    async fn test_enqueue_overwrite_clears_dlq_entry() {
        let store = setup_test_store().await;
        let job = Job::new("j1", "false", 0, 1000);
        store.insert_or_replace_job(&job).await.unwrap();
        store.move_to_dlq(&job, 1, "exit 1", 2000).await.unwrap();

        // re-enqueueing the same id replaces the DLQ entry with a fresh job
        store
            .insert_or_replace_job(&Job::new("j1", "true", 3, 3000))
            .await
            .unwrap();

        assert_eq!(store.count_dlq().await.unwrap(), 0);
        let job = store.get_job("j1").await.unwrap().unwrap();
        assert_eq!(job.command, "true");
        assert_eq!(job.attempts, 0);
    }

    #[tokio::test]
    async fn test_list_jobs_filtering() {
        let store = setup_test_store().await;
        store
            .insert_or_replace_job(&Job::new("a", "true", 3, 1000))
            .await
            .unwrap();
        store
            .insert_or_replace_job(&Job::new("b", "true", 3, 2000))
            .await
            .unwrap();
        store
            .update_job_state("b", JobState::Completed, Some(1), None)
            .await
            .unwrap();

        let all = store.list_jobs(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "a");

        let pending = store.list_jobs(Some(JobState::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "a");

        assert_eq!(store.count_jobs(JobState::Completed).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let store = setup_test_store().await;
        // seeded by the migration
        assert_eq!(
            store.get_config("max_retries").await.unwrap(),
            Some("3".to_string())
        );
        store.set_config("max_retries", "7").await.unwrap();
        assert_eq!(
            store.get_config("max_retries").await.unwrap(),
            Some("7".to_string())
        );
        assert_eq!(store.get_config("nope").await.unwrap(), None);
    }
}
