//! Cooperative shutdown of the queue and worker pool.

use crate::pool::{JoinReport, WorkerPool};
use crate::queue::JobQueue;
use hookd_core::Job;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

/// What a shutdown did.
#[derive(Debug)]
pub struct ShutdownReport {
    /// Jobs that were still queued and will never run.
    pub discarded: Vec<Job>,
    pub join: JoinReport,
}

/// Owns the termination sequence: set the flag, wake every idle worker,
/// discard queued jobs, then join the workers.
pub struct ShutdownCoordinator {
    queue: Arc<JobQueue>,
    pool: Mutex<Option<WorkerPool>>,
    join_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(queue: Arc<JobQueue>, pool: WorkerPool, join_timeout: Duration) -> Self {
        Self {
            queue,
            pool: Mutex::new(Some(pool)),
            join_timeout,
        }
    }

    pub fn is_terminating(&self) -> bool {
        self.queue.is_shutdown()
    }

    /// Shut everything down. Only the first call does anything; later calls
    /// return `None` immediately.
    ///
    /// Blocks while workers finish their current job, up to the join timeout
    /// per worker.
    pub fn terminate(&self) -> Option<ShutdownReport> {
        let pool = self
            .pool
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()?;

        self.queue.shutdown();
        info!(workers = pool.len(), "Shutting down, waking idle workers");

        let discarded = self.queue.drain_pending();
        for job in &discarded {
            info!(
                job_id = %job.id,
                repo = %job.repo_name,
                commit = %job.commit_id,
                "Discarding queued job"
            );
        }
        if !discarded.is_empty() {
            warn!(count = discarded.len(), "Queued jobs discarded at shutdown");
        }

        let join = pool.shutdown_and_join(self.join_timeout);
        if join.all_joined() {
            info!("All worker threads exited");
        } else {
            error!(
                timed_out = join.timed_out.len(),
                panicked = join.panicked.len(),
                "Some worker threads did not exit cleanly"
            );
        }

        Some(ShutdownReport { discarded, join })
    }
}
