//! Fixed-size pool of worker threads.

use crate::pipeline::BuildPipeline;
use crate::queue::JobQueue;
use crate::worker::{Worker, WorkerStats};
use hookd_core::{Result, WorkerId};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Outcome of joining the pool's workers.
#[derive(Debug, Default)]
pub struct JoinReport {
    /// Workers that exited in time, with their counters.
    pub joined: Vec<(WorkerId, WorkerStats)>,
    /// Workers still busy when their join timeout expired. Their threads are detached.
    pub timed_out: Vec<WorkerId>,
    /// Workers whose thread panicked.
    pub panicked: Vec<WorkerId>,
}

impl JoinReport {
    pub fn all_joined(&self) -> bool {
        self.timed_out.is_empty() && self.panicked.is_empty()
    }
}

struct WorkerHandle {
    id: WorkerId,
    workspace: PathBuf,
    busy: Arc<AtomicBool>,
    thread: JoinHandle<WorkerStats>,
}

/// Announces a worker's exit, including exit by panic.
struct ExitGuard {
    id: WorkerId,
    exited: Sender<WorkerId>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let _ = self.exited.send(self.id);
    }
}

/// Owns the worker threads.
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    workers: Vec<WorkerHandle>,
    exited: Receiver<WorkerId>,
}

impl WorkerPool {
    /// Start `count` workers, each with its own workspace under `work_dir`.
    pub fn start(
        count: usize,
        work_dir: &Path,
        queue: Arc<JobQueue>,
        pipeline: Arc<BuildPipeline>,
    ) -> Result<Self> {
        // Create every workspace before any thread starts.
        let workers = (0..count)
            .map(|i| Worker::new(WorkerId::new(i), work_dir, queue.clone(), pipeline.clone()))
            .collect::<Result<Vec<_>>>()?;

        let (exited_tx, exited) = mpsc::channel();
        let mut handles = Vec::with_capacity(count);

        for worker in workers {
            let id = worker.id();
            let workspace = worker.workspace().to_path_buf();
            let busy = worker.busy_flag();
            let guard = ExitGuard {
                id,
                exited: exited_tx.clone(),
            };

            let spawned = thread::Builder::new()
                .name(id.to_string())
                .spawn(move || {
                    let _guard = guard;
                    worker.run()
                });

            match spawned {
                Ok(thread) => handles.push(WorkerHandle {
                    id,
                    workspace,
                    busy,
                    thread,
                }),
                Err(e) => {
                    error!(worker = %id, error = %e, "Failed to spawn worker thread");
                    // Let the threads already started exit.
                    queue.shutdown();
                    return Err(e.into());
                }
            }
        }

        info!(workers = handles.len(), "Spawned worker threads");

        Ok(Self {
            queue,
            workers: handles,
            exited,
        })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn workspaces(&self) -> Vec<&Path> {
        self.workers.iter().map(|w| w.workspace.as_path()).collect()
    }

    /// Signal shutdown and wait up to `timeout` for each worker in turn.
    ///
    /// Workers finish the job they are running before exiting. A worker still
    /// busy with a job after its timeout is reported and left running
    /// detached. Idle workers are always joined, whatever the timeout.
    pub fn shutdown_and_join(self, timeout: Duration) -> JoinReport {
        self.queue.shutdown();

        let mut exited = HashSet::new();
        let mut report = JoinReport::default();

        for handle in self.workers {
            let deadline = Instant::now() + timeout;
            while !exited.contains(&handle.id) {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match self.exited.recv_timeout(remaining) {
                    Ok(id) => {
                        exited.insert(id);
                    }
                    Err(_) => break,
                }
            }

            // After shutdown an idle worker can no longer claim a job, so it
            // is about to exit.
            if !exited.contains(&handle.id) && !handle.busy.load(Ordering::SeqCst) {
                while let Ok(id) = self.exited.recv() {
                    exited.insert(id);
                    if id == handle.id {
                        break;
                    }
                }
            }

            if !exited.contains(&handle.id) {
                warn!(
                    worker = %handle.id,
                    ?timeout,
                    "Worker did not exit in time, detaching"
                );
                report.timed_out.push(handle.id);
                continue;
            }

            match handle.thread.join() {
                Ok(stats) => {
                    info!(
                        worker = %handle.id,
                        jobs = stats.jobs,
                        succeeded = stats.succeeded,
                        failed = stats.failed,
                        "Worker joined"
                    );
                    report.joined.push((handle.id, stats));
                }
                Err(_) => {
                    error!(worker = %handle.id, "Worker thread panicked");
                    report.panicked.push(handle.id);
                }
            }
        }

        report
    }
}
