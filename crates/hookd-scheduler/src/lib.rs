//! Job scheduling for the hookd build daemon.
//!
//! Accepted notifications become jobs on an in-memory FIFO queue. A fixed
//! pool of worker threads pops jobs and runs the build pipeline for each one
//! in the worker's own workspace. Shutdown wakes every idle worker, lets busy
//! workers finish, and discards whatever is still queued.

pub mod dispatcher;
pub mod pipeline;
pub mod pool;
pub mod queue;
pub mod shutdown;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use pipeline::{BuildPipeline, PipelineReport, PipelineState};
pub use pool::{JoinReport, WorkerPool};
pub use queue::{JobQueue, Popped, QueueError};
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
pub use worker::{Worker, WorkerStats};
