// Application Layer - Use Cases and Engine Services

pub mod dispatcher;
pub mod lifecycle;
pub mod queue_service;
pub mod recovery;
pub mod worker;

// Re-exports
pub use dispatcher::Dispatcher;
pub use lifecycle::{decide, FailureOutcome, JobLifecycle, RetryDecision};
pub use queue_service::{EnqueueRequest, QueueService, QueueStats};
pub use recovery::RecoveryService;
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, Worker, WorkerPool};
