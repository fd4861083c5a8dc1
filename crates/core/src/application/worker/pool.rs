// Worker Pool - opaque handle over a set of independently cancellable loops

use super::constants::POOL_JOIN_TIMEOUT;
use super::shutdown::ShutdownSender;
use tokio::task::JoinHandle;
use tracing::{info, warn};

struct PoolMember {
    name: String,
    shutdown: ShutdownSender,
    handle: JoinHandle<()>,
}

/// Handle returned by `QueueService::start_workers`
///
/// Owns one shutdown channel and join handle per worker. Pools are
/// independent: stopping this pool signals only its own members, so workers
/// started later (in a new pool) are unaffected.
pub struct WorkerPool {
    members: Vec<PoolMember>,
}

impl WorkerPool {
    pub(crate) fn new() -> Self {
        Self {
            members: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, name: String, shutdown: ShutdownSender, handle: JoinHandle<()>) {
        self.members.push(PoolMember {
            name,
            shutdown,
            handle,
        });
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn worker_names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.name.as_str()).collect()
    }

    /// Signal one worker by name to stop after its current iteration
    pub fn signal_stop_worker(&self, name: &str) -> bool {
        match self.members.iter().find(|m| m.name == name) {
            Some(member) => {
                member.shutdown.shutdown();
                true
            }
            None => false,
        }
    }

    /// Signal every worker in this pool to stop
    pub fn signal_stop(&self) {
        for member in &self.members {
            member.shutdown.shutdown();
        }
    }

    /// Signal all workers and wait for their loops to finish
    ///
    /// Each join is bounded; a loop still blocked on an in-flight command
    /// past the bound is left to the runtime and logged.
    pub async fn shutdown(self) {
        self.signal_stop();
        for member in self.members {
            match tokio::time::timeout(POOL_JOIN_TIMEOUT, member.handle).await {
                Ok(_) => info!(worker = %member.name, "worker joined"),
                Err(_) => {
                    warn!(worker = %member.name, "worker did not stop within the join timeout")
                }
            }
        }
    }
}
