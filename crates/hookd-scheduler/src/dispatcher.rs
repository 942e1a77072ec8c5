//! Turns accepted notifications into queued jobs.

use crate::queue::{JobQueue, QueueError};
use hookd_core::{AllowList, Job, JobId, Notification, Rejection};
use std::sync::Arc;
use tracing::{info, warn};

/// What happened to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A job was queued.
    Queued { job_id: JobId, pending: usize },
    /// The notification failed validation; nothing was queued.
    Rejected(Rejection),
    /// The notification was valid but the queue refused the job.
    Refused(QueueError),
}

impl DispatchOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, DispatchOutcome::Queued { .. })
    }
}

/// Validates notifications and feeds the job queue.
pub struct Dispatcher {
    allow_list: AllowList,
    queue: Arc<JobQueue>,
}

impl Dispatcher {
    pub fn new(allow_list: AllowList, queue: Arc<JobQueue>) -> Self {
        Self { allow_list, queue }
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Validate a notification and queue a job for it.
    ///
    /// Blocks on nothing but the queue's O(1) push. The outcome is for
    /// acknowledging the sender only; it says nothing about the build.
    pub fn dispatch(&self, notification: Notification) -> DispatchOutcome {
        info!(
            repo = %notification.repo_name,
            url = %notification.repo_url,
            commit = %notification.commit_id,
            "Received commit notification"
        );

        if let Err(rejection) = self.validate(&notification) {
            info!(
                repo = %notification.repo_name,
                url = %notification.repo_url,
                reason = %rejection,
                "Rejected notification"
            );
            return DispatchOutcome::Rejected(rejection);
        }

        let job = Job::from_notification(notification);
        let job_id = job.id;
        let repo = job.repo_name.clone();

        match self.queue.push(job) {
            Ok(()) => {
                let pending = self.queue.len();
                info!(job_id = %job_id, repo = %repo, pending, "Queued job");
                DispatchOutcome::Queued { job_id, pending }
            }
            Err(e) => {
                warn!(job_id = %job_id, repo = %repo, error = %e, "Job not queued");
                DispatchOutcome::Refused(e)
            }
        }
    }

    fn validate(&self, notification: &Notification) -> Result<(), Rejection> {
        self.allow_list
            .check(&notification.repo_name, &notification.repo_url)?;
        if !notification.has_valid_commit_id() {
            return Err(Rejection::InvalidCommit(notification.commit_id.clone()));
        }
        Ok(())
    }
}
