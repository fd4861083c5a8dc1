// Domain Layer - Pure business logic and entities

pub mod config;
pub mod dead_letter;
pub mod error;
pub mod job;

// Re-exports
pub use config::{
    base_backoff_seconds_from, max_retries_from, CONFIG_BASE_BACKOFF_SECONDS, CONFIG_MAX_RETRIES,
    DEFAULT_BASE_BACKOFF_SECONDS, DEFAULT_MAX_RETRIES,
};
pub use dead_letter::DeadLetterEntry;
pub use error::DomainError;
pub use job::{Job, JobId, JobState};
