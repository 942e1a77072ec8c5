//! Worker that processes jobs from the queue.

use crate::pipeline::{BuildPipeline, PipelineReport};
use crate::queue::{JobQueue, Popped};
use hookd_core::{Error, Job, Result, WorkerId};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info};

/// Counters reported by a worker when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub jobs: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// A worker that pops jobs and runs them, one at a time, in its own workspace.
pub struct Worker {
    id: WorkerId,
    workspace: PathBuf,
    queue: Arc<JobQueue>,
    pipeline: Arc<BuildPipeline>,
    /// Set while a job is in hand.
    busy: Arc<AtomicBool>,
}

impl Worker {
    /// Create a worker whose workspace lives under `work_dir`, creating the
    /// workspace directory if needed.
    pub fn new(
        id: WorkerId,
        work_dir: &Path,
        queue: Arc<JobQueue>,
        pipeline: Arc<BuildPipeline>,
    ) -> Result<Self> {
        let workspace = work_dir.join(id.workspace_dir_name());

        if !workspace.is_dir() {
            info!(worker = %id, dir = %workspace.display(), "Workspace directory does not exist, creating");
            fs::create_dir_all(&workspace).map_err(|e| {
                Error::Infrastructure(format!(
                    "cannot create workspace {}: {}",
                    workspace.display(),
                    e
                ))
            })?;
        }

        Ok(Self {
            id,
            workspace,
            queue,
            pipeline,
            busy: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Flag that is set from the moment a job is popped until it finishes.
    pub fn busy_flag(&self) -> Arc<AtomicBool> {
        self.busy.clone()
    }

    /// Run the worker loop until the queue shuts down.
    ///
    /// A job that is running when shutdown is requested is finished first.
    pub fn run(&self) -> WorkerStats {
        info!(worker = %self.id, workspace = %self.workspace.display(), "Starting worker");
        let mut stats = WorkerStats::default();

        loop {
            match self.queue.pop_claiming(&self.busy) {
                Popped::Job(job) => {
                    info!(
                        worker = %self.id,
                        job_id = %job.id,
                        repo = %job.repo_name,
                        commit = %job.commit_id,
                        "Got job"
                    );

                    stats.jobs += 1;
                    match self.execute(&job) {
                        Some(report) if report.is_success() => stats.succeeded += 1,
                        Some(report) => {
                            if let Err(e) = report.outcome() {
                                info!(worker = %self.id, job_id = %job.id, error = %e, "Build failed");
                            }
                            stats.failed += 1;
                        }
                        None => stats.failed += 1,
                    }
                    self.busy.store(false, Ordering::SeqCst);
                }
                Popped::Shutdown => {
                    debug!(worker = %self.id, "Worker exiting");
                    break;
                }
            }
        }

        stats
    }

    fn execute(&self, job: &Job) -> Option<PipelineReport> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.pipeline.execute(self.id, &self.workspace, job)
        }));

        match result {
            Ok(report) => Some(report),
            Err(_) => {
                error!(worker = %self.id, job_id = %job.id, "Pipeline panicked");
                None
            }
        }
    }
}
