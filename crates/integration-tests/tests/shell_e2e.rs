// End-to-end: real shell commands through the full stack

use std::sync::Arc;
use std::time::{Duration, Instant};

use queuectl_core::application::{EnqueueRequest, QueueService};
use queuectl_core::domain::JobState;
use queuectl_core::port::id_provider::UuidProvider;
use queuectl_core::port::time_provider::SystemTimeProvider;
use queuectl_core::port::TimeProvider;
use queuectl_infra_sqlite::{create_pool, run_migrations, SqliteJobStore};
use queuectl_infra_system::ShellCommandRunner;

struct TempDb {
    path: String,
}

impl TempDb {
    fn new(name: &str) -> Self {
        let path = format!("/tmp/queuectl_test_{}_{}.db", name, std::process::id());
        let _ = std::fs::remove_file(&path);
        Self { path }
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.path, suffix));
        }
    }
}

async fn shell_service(db: &TempDb, timeout: Duration) -> QueueService {
    let pool = create_pool(&db.path).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let store = Arc::new(SqliteJobStore::new(pool, time_provider.clone()));
    let runner = Arc::new(ShellCommandRunner::with_timeout(
        time_provider.clone(),
        timeout,
    ));
    QueueService::new(store, runner, Arc::new(UuidProvider), time_provider)
}

#[tokio::test]
async fn shell_success_and_failure_paths() {
    let db = TempDb::new("shell_paths");
    let service = shell_service(&db, Duration::from_secs(30)).await;

    service
        .enqueue(EnqueueRequest {
            id: Some("ok".to_string()),
            command: "echo hello".to_string(),
            max_retries: Some(0),
        })
        .await
        .unwrap();
    service
        .enqueue(EnqueueRequest {
            id: Some("bad".to_string()),
            command: "echo broken >&2; exit 7".to_string(),
            max_retries: Some(0),
        })
        .await
        .unwrap();

    let pool = service.start_workers(2);

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let stats = service.stats().await.unwrap();
        if stats.completed == 1 && stats.dead_lettered == 1 {
            break;
        }
        assert!(Instant::now() < deadline, "jobs did not settle in time");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    service.stop_workers(pool).await;

    let ok = service.get_job("ok").await.unwrap().unwrap();
    assert_eq!(ok.state, JobState::Completed);
    assert_eq!(ok.attempts, 1);

    let dlq = service.list_dlq().await.unwrap();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].id, "bad");
    assert_eq!(dlq[0].attempts, 1);
    assert!(dlq[0].last_error.contains("exit 7"));
    assert!(dlq[0].last_error.contains("broken"));
}

#[tokio::test]
async fn command_exceeding_the_ceiling_is_a_timeout_failure() {
    let db = TempDb::new("shell_timeout");
    let service = shell_service(&db, Duration::from_millis(200)).await;

    service
        .enqueue(EnqueueRequest {
            id: Some("slow".to_string()),
            command: "sleep 30".to_string(),
            max_retries: Some(0),
        })
        .await
        .unwrap();

    let pool = service.start_workers(1);

    let deadline = Instant::now() + Duration::from_secs(10);
    while service.stats().await.unwrap().dead_lettered != 1 {
        assert!(Instant::now() < deadline, "slow job never dead-lettered");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    service.stop_workers(pool).await;

    let dlq = service.list_dlq().await.unwrap();
    assert_eq!(dlq[0].id, "slow");
    assert!(dlq[0].last_error.contains("Timed out"));
}
