// Shell command runner
// Spawns `sh -c <command>` with piped output and a bounded execution timeout

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use queuectl_core::application::worker::constants::DEFAULT_EXECUTION_TIMEOUT;
use queuectl_core::domain::Job;
use queuectl_core::port::command_runner::{
    CommandRunner, ExecutionError, ExecutionResult, ExecutionStatus,
};
use queuectl_core::port::TimeProvider;
use std::sync::Arc;

/// Executes job commands through the system shell
///
/// The command string is opaque to the engine; anything the shell accepts
/// runs here. Restricting what commands may do is the embedding host's
/// concern, not this adapter's.
pub struct ShellCommandRunner {
    time_provider: Arc<dyn TimeProvider>,
    execution_timeout: Duration,
}

impl ShellCommandRunner {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self::with_timeout(time_provider, DEFAULT_EXECUTION_TIMEOUT)
    }

    pub fn with_timeout(time_provider: Arc<dyn TimeProvider>, execution_timeout: Duration) -> Self {
        Self {
            time_provider,
            execution_timeout,
        }
    }

    /// Spawn the shell and wait for output, bounded by the timeout
    async fn spawn_and_wait(&self, command: &str) -> Result<std::process::Output, ExecutionError> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed(e.to_string()))?;

        match timeout(self.execution_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ExecutionError::IoError(e.to_string())),
            Err(_) => Err(ExecutionError::Timeout(self.execution_timeout.as_secs())),
        }
    }

    fn build_result(&self, output: std::process::Output, duration_ms: i64) -> ExecutionResult {
        let status = if output.status.success() {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failed
        };

        ExecutionResult {
            status,
            exit_code: output.status.code(),
            duration_ms,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn execute(&self, job: &Job) -> Result<ExecutionResult, ExecutionError> {
        let started_at = self.time_provider.now_millis();

        info!(job_id = %job.id, "spawning shell command");
        let output = self.spawn_and_wait(&job.command).await.map_err(|e| {
            warn!(job_id = %job.id, error = %e, "command did not produce an exit status");
            e
        })?;

        let duration_ms = self.time_provider.now_millis() - started_at;
        let result = self.build_result(output, duration_ms);

        info!(
            job_id = %job.id,
            exit_code = ?result.exit_code,
            duration_ms = %duration_ms,
            "shell command finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuectl_core::port::time_provider::SystemTimeProvider;

    fn runner() -> ShellCommandRunner {
        ShellCommandRunner::new(Arc::new(SystemTimeProvider))
    }

    fn job(command: &str) -> Job {
        Job::new("test-job", command, 3, 0)
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        let result = runner().execute(&job("echo hello")).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_is_failure_with_stderr() {
        let result = runner()
            .execute(&job("echo oops >&2; exit 3"))
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let runner = ShellCommandRunner::with_timeout(
            Arc::new(SystemTimeProvider),
            Duration::from_millis(100),
        );
        let result = runner.execute(&job("sleep 5")).await;
        assert!(matches!(result, Err(ExecutionError::Timeout(_))));
    }
}
