// Job Domain Model

use serde::{Deserialize, Serialize};

/// Job ID (caller-supplied or UUID v4)
pub type JobId = String;

/// Job State
///
/// Dead-lettered jobs are not a state: they leave the job set entirely and
/// become [`crate::domain::DeadLetterEntry`] rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Completed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::Completed => write!(f, "COMPLETED"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = crate::domain::error::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobState::Pending),
            "RUNNING" => Ok(JobState::Running),
            "COMPLETED" => Ok(JobState::Completed),
            other => Err(crate::domain::error::DomainError::UnknownState(
                other.to_string(),
            )),
        }
    }
}

/// Job Entity
///
/// `attempts` counts total execution tries (the try that succeeds is counted
/// too) and only ever increases, except across the explicit retry-now reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Opaque shell command; the engine never interprets its content.
    pub command: String,
    pub state: JobState,

    pub attempts: i64,
    pub max_retries: i64,

    pub created_at: i64, // epoch ms
    pub updated_at: i64,
    /// When set and in the future, the job is ineligible for dispatch.
    pub next_run_at: Option<i64>,
}

impl Job {
    /// Create a new Pending job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `command` - Shell command to execute
    /// * `max_retries` - Retry ceiling, fixed for the job's lifetime
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    pub fn new(
        id: impl Into<String>,
        command: impl Into<String>,
        max_retries: i64,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            state: JobState::Pending,
            attempts: 0,
            max_retries,
            created_at,
            updated_at: created_at,
            next_run_at: None,
        }
    }

    /// Whether the job may be dispatched at `now_ms`
    pub fn is_eligible(&self, now_ms: i64) -> bool {
        self.state == JobState::Pending && self.next_run_at.map_or(true, |t| t <= now_ms)
    }

    /// Transition to Running with explicit timestamp (claim)
    pub fn start(&mut self, now_ms: i64) -> crate::domain::error::Result<()> {
        if self.state != JobState::Pending {
            return Err(crate::domain::error::DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: "RUNNING".to_string(),
            });
        }
        self.state = JobState::Running;
        self.updated_at = now_ms;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn new_test(id: impl Into<String>, created_at: i64) -> Self {
        Self::new(id, "true", 3, created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_text() {
        for state in [JobState::Pending, JobState::Running, JobState::Completed] {
            let parsed: JobState = state.to_string().parse().unwrap();
            assert_eq!(parsed, state);
        }
        assert!("ZOMBIE".parse::<JobState>().is_err());
    }

    #[test]
    fn eligibility_respects_next_run_at() {
        let mut job = Job::new_test("j1", 1000);
        assert!(job.is_eligible(1000));

        job.next_run_at = Some(5000);
        assert!(!job.is_eligible(4999));
        assert!(job.is_eligible(5000));

        job.state = JobState::Running;
        assert!(!job.is_eligible(10_000));
    }

    #[test]
    fn start_rejects_non_pending() {
        let mut job = Job::new_test("j1", 1000);
        job.start(2000).unwrap();
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.updated_at, 2000);
        assert!(job.start(3000).is_err());
    }
}
