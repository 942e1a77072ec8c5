//! In-memory job queue shared by the dispatcher and the workers.
//!
//! A single mutex guards both the pending jobs and the shutdown flag, and a
//! condition variable parks idle workers. `push` wakes exactly one waiter;
//! `shutdown` wakes all of them so that every idle worker observes
//! termination. The lock is only held for O(1) queue operations.

use hookd_core::Job;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use thiserror::Error;

/// Why a job could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue is full ({capacity} jobs pending)")]
    Full { capacity: usize },

    #[error("queue is shutting down")]
    Closed,
}

/// Result of a blocking pop.
#[derive(Debug)]
pub enum Popped {
    Job(Job),
    Shutdown,
}

#[derive(Debug, Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    shutdown: bool,
}

/// FIFO job queue with blocking pop.
#[derive(Debug)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    /// Maximum pending jobs; `None` means unbounded.
    capacity: Option<usize>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl JobQueue {
    pub fn unbounded() -> Self {
        Self::with_capacity(0)
    }

    /// Create a queue holding at most `capacity` pending jobs. Zero means unbounded.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            capacity: (capacity > 0).then_some(capacity),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    // A worker that panicked never holds this lock across user code, so the
    // state behind a poisoned mutex is still consistent.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a job to the tail. Never blocks beyond the O(1) insertion.
    pub fn push(&self, job: Job) -> Result<(), QueueError> {
        let mut state = self.lock();
        if state.shutdown {
            return Err(QueueError::Closed);
        }
        if let Some(capacity) = self.capacity {
            if state.jobs.len() >= capacity {
                return Err(QueueError::Full { capacity });
            }
        }
        state.jobs.push_back(job);
        drop(state);

        // One new item needs only one worker.
        self.available.notify_one();
        Ok(())
    }

    /// Remove and return the head of the queue, waiting while it is empty.
    ///
    /// Returns `Popped::Shutdown` as soon as shutdown has been requested, even
    /// if jobs are still pending; those are left for the coordinator to discard.
    pub fn pop_blocking(&self) -> Popped {
        self.pop_inner(|| {})
    }

    /// Like [`pop_blocking`](Self::pop_blocking), but sets `busy` while still
    /// holding the lock when a job is handed out.
    ///
    /// Once `shutdown` has returned, a worker whose flag is clear holds no
    /// job and never will.
    pub fn pop_claiming(&self, busy: &AtomicBool) -> Popped {
        self.pop_inner(|| busy.store(true, Ordering::SeqCst))
    }

    fn pop_inner(&self, claim: impl FnOnce()) -> Popped {
        let mut state = self.lock();
        loop {
            if state.shutdown {
                return Popped::Shutdown;
            }
            if let Some(job) = state.jobs.pop_front() {
                claim();
                return Popped::Job(job);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Set the shutdown flag and wake every waiting worker.
    ///
    /// Returns `true` only for the call that actually flipped the flag.
    pub fn shutdown(&self) -> bool {
        let mut state = self.lock();
        if state.shutdown {
            return false;
        }
        state.shutdown = true;
        drop(state);

        self.available.notify_all();
        true
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    /// Remove every pending job without running it.
    pub fn drain_pending(&self) -> Vec<Job> {
        self.lock().jobs.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
