//! Application state.

use hookd_scheduler::{Dispatcher, JobQueue};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub queue: Arc<JobQueue>,
    pub workers: usize,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, queue: Arc<JobQueue>, workers: usize) -> Self {
        Self {
            dispatcher,
            queue,
            workers,
        }
    }
}
