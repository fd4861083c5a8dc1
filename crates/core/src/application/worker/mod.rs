// Worker - Job execution loop

pub mod constants;
mod pool;
mod shutdown;

use constants::*;
pub use pool::WorkerPool;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::dispatcher::Dispatcher;
use crate::application::lifecycle::JobLifecycle;
use crate::error::Result;
use crate::port::{CommandRunner, ExecutionResult, ExecutionStatus, JobStore, TimeProvider};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info};

/// A single execution loop: fetch -> execute -> report outcome
///
/// Workers are independent; any two may be mid-execution of different jobs
/// simultaneously. All coordination goes through the store's claim.
pub struct Worker {
    name: String,
    dispatcher: Dispatcher,
    lifecycle: JobLifecycle,
    runner: Arc<dyn CommandRunner>,
}

impl Worker {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn JobStore>,
        runner: Arc<dyn CommandRunner>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            dispatcher: Dispatcher::new(Arc::clone(&store), Arc::clone(&time_provider)),
            lifecycle: JobLifecycle::new(store, time_provider),
            runner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the worker loop until the shutdown signal is observed
    ///
    /// The signal is checked between iterations only: a job already claimed
    /// runs to completion (or to its execution timeout). An engine-level
    /// fault outside job execution stops this worker; the rest of the pool
    /// keeps running.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(worker = %self.name, "worker started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            match self.process_next_job().await {
                Ok(true) => {}
                Ok(false) => {
                    // No eligible job; back off briefly instead of busy-spinning
                    tokio::select! {
                        _ = sleep(IDLE_SLEEP_DURATION) => {}
                        _ = shutdown.wait() => break,
                    }
                }
                Err(e) => {
                    error!(worker = %self.name, error = %e, "worker stopping after engine fault");
                    return Err(e);
                }
            }
        }
        info!(worker = %self.name, "worker stopped");
        Ok(())
    }

    /// Process the next eligible job (returns true if one was executed)
    ///
    /// Execution failures never escape as errors here: they are absorbed into
    /// the retry/backoff/DLQ state machine. Only storage faults propagate.
    pub async fn process_next_job(&self) -> Result<bool> {
        let job = match self.dispatcher.fetch_next().await? {
            Some(j) => j,
            None => return Ok(false),
        };

        info!(
            worker = %self.name,
            job_id = %job.id,
            attempt = %(job.attempts + 1),
            "executing job"
        );

        match self.runner.execute(&job).await {
            Ok(result) if result.status == ExecutionStatus::Success => {
                info!(
                    worker = %self.name,
                    job_id = %job.id,
                    duration_ms = %result.duration_ms,
                    "command succeeded"
                );
                self.lifecycle.complete(&job).await?;
            }
            Ok(result) => {
                self.lifecycle.fail(&job, &failure_diagnostic(&result)).await?;
            }
            Err(e) => {
                // Spawn failure or timeout: same path as a non-zero exit
                self.lifecycle.fail(&job, &e.to_string()).await?;
            }
        }
        Ok(true)
    }
}

/// Render a failed execution as a one-line diagnostic for the DLQ
fn failure_diagnostic(result: &ExecutionResult) -> String {
    let stderr = result.stderr.trim();
    match result.exit_code {
        Some(code) => format!("exit {}: {}", code, stderr),
        None => format!("terminated by signal: {}", stderr),
    }
}
