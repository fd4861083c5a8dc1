// Worker constants (no magic values)
use std::time::Duration;

/// Sleep duration when no eligible job is available (500ms)
///
/// A bounded poll interval, not a correctness dependency.
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(500);

/// Ceiling on a single command execution (300s); exceeding it is a failure
/// with a timeout diagnostic
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(300);

/// Bound on waiting for a worker loop to finish during pool shutdown (5s)
pub const POOL_JOIN_TIMEOUT: Duration = Duration::from_secs(5);
