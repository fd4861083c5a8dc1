// Command Runner Port
// Abstraction for executing a job's opaque shell command

use crate::domain::Job;
use async_trait::async_trait;
use thiserror::Error;

/// Result of command execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub duration_ms: i64,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failed,
}

/// Execution errors
///
/// All of these are absorbed by the worker into the retry state machine;
/// callers of the engine never see them as operation failures.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Command Runner trait
///
/// Implementations:
/// - ShellCommandRunner: spawns `sh -c <command>` with a bounded timeout
/// - MockCommandRunner: scripted outcomes for tests
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Execute a job's command and return the outcome
    ///
    /// # Errors
    /// - ExecutionError::SpawnFailed if the process cannot be started
    /// - ExecutionError::Timeout if execution exceeds the ceiling
    async fn execute(&self, job: &Job) -> Result<ExecutionResult, ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock runner behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed
        Success,
        /// Always fail with message
        Fail(String),
        /// Fail the first N calls, then succeed
        FailTimes(u32, String),
    }

    /// Mock Command Runner for testing
    pub struct MockCommandRunner {
        behavior: MockBehavior,
        call_count: Arc<Mutex<usize>>,
    }

    impl MockCommandRunner {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior,
                call_count: Arc::new(Mutex::new(0)),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }

        pub fn new_fail_times(failures: u32, message: impl Into<String>) -> Self {
            Self::new(MockBehavior::FailTimes(failures, message.into()))
        }

        pub fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }

        fn success_result() -> ExecutionResult {
            ExecutionResult {
                status: ExecutionStatus::Success,
                duration_ms: 5,
                exit_code: Some(0),
                stdout: "mock output".to_string(),
                stderr: String::new(),
            }
        }

        fn failed_result(msg: &str) -> ExecutionResult {
            ExecutionResult {
                status: ExecutionStatus::Failed,
                duration_ms: 5,
                exit_code: Some(1),
                stdout: String::new(),
                stderr: msg.to_string(),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for MockCommandRunner {
        async fn execute(&self, _job: &Job) -> Result<ExecutionResult, ExecutionError> {
            let calls_before = {
                let mut count = self.call_count.lock().unwrap();
                *count += 1;
                *count - 1
            };

            match &self.behavior {
                MockBehavior::Success => Ok(Self::success_result()),
                MockBehavior::Fail(msg) => Ok(Self::failed_result(msg)),
                MockBehavior::FailTimes(failures, msg) => {
                    if calls_before < *failures as usize {
                        Ok(Self::failed_result(msg))
                    } else {
                        Ok(Self::success_result())
                    }
                }
            }
        }
    }
}
