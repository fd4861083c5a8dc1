// Dead Letter Queue Domain Model

use serde::{Deserialize, Serialize};

/// A job that exhausted its retry budget
///
/// Created only by the lifecycle manager on retry exhaustion; destroyed by
/// purge, or by retry-from-DLQ which converts it back into a Pending job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: String,
    pub command: String,
    /// Final attempt count at the moment of exhaustion.
    pub attempts: i64,
    pub max_retries: i64,
    pub failed_at: i64, // epoch ms
    /// Free-text diagnostic from the last failed execution.
    pub last_error: String,
}
