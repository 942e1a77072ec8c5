//! Commit notifications and build jobs.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::JobId;

static COMMIT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{4,64}$").expect("valid regex"));

/// A decoded commit notification, as handed over by the ingestion layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub repo_name: String,
    pub repo_url: String,
    pub commit_id: String,
}

impl Notification {
    pub fn new(
        repo_name: impl Into<String>,
        repo_url: impl Into<String>,
        commit_id: impl Into<String>,
    ) -> Self {
        Self {
            repo_name: repo_name.into(),
            repo_url: repo_url.into(),
            commit_id: commit_id.into(),
        }
    }

    /// Whether the commit id looks like an abbreviated or full object name.
    ///
    /// The id ends up in a log file name and on a `git checkout` command line,
    /// so anything other than hex digits is refused.
    pub fn has_valid_commit_id(&self) -> bool {
        COMMIT_ID_RE.is_match(&self.commit_id)
    }
}

/// One commit to build. Never mutated after the dispatcher creates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub repo_name: String,
    pub repo_url: String,
    pub commit_id: String,
    pub received_at: DateTime<Utc>,
}

impl Job {
    pub fn from_notification(notification: Notification) -> Self {
        Self {
            id: JobId::new(),
            repo_name: notification.repo_name,
            repo_url: notification.repo_url,
            commit_id: notification.commit_id,
            received_at: Utc::now(),
        }
    }

    /// Short form of the commit id for log lines.
    pub fn short_commit(&self) -> &str {
        &self.commit_id[..7.min(self.commit_id.len())]
    }
}
