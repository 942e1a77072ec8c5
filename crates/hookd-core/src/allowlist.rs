//! Repository/account allow-list.
//!
//! Notifications are accepted only for repositories whose name is listed and
//! whose URL points at a listed account. A repository URL must have exactly
//! two path segments, `<account>/<repository>`, e.g.
//! `https://github.com/openplans/hookd`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use url::Url;

/// Why a notification was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("malformed repository URL: {0}")]
    MalformedUrl(String),

    #[error("repository '{0}' is not allowed")]
    RepositoryNotAllowed(String),

    #[error("account '{0}' is not allowed")]
    AccountNotAllowed(String),

    #[error("repository name '{name}' does not match URL repository '{url_repository}'")]
    NameMismatch {
        name: String,
        url_repository: String,
    },

    #[error("invalid commit id: {0:?}")]
    InvalidCommit(String),
}

/// Account and repository segments parsed from a repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    pub account: String,
    pub repository: String,
}

impl RepoCoordinates {
    /// Split a repository URL into its account and repository segments.
    ///
    /// Returns `None` unless the URL parses and its path is exactly two
    /// non-empty segments.
    pub fn parse(repo_url: &str) -> Option<Self> {
        let url = Url::parse(repo_url).ok()?;
        url.host_str()?;

        let segments: Vec<&str> = url.path_segments()?.collect();
        match segments.as_slice() {
            [account, repository] if !account.is_empty() && !repository.is_empty() => {
                Some(Self {
                    account: account.to_string(),
                    repository: repository.to_string(),
                })
            }
            _ => None,
        }
    }
}

/// Configured sets of acceptable repository names and account names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowList {
    pub repositories: BTreeSet<String>,
    pub accounts: BTreeSet<String>,
}

impl AllowList {
    pub fn new<R, A>(repositories: R, accounts: A) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            repositories: repositories.into_iter().map(Into::into).collect(),
            accounts: accounts.into_iter().map(Into::into).collect(),
        }
    }

    /// Check a repository name and URL against the allow-list.
    ///
    /// Pure: never touches shared state, never fails on bad input. Malformed
    /// input is a rejection like any other.
    pub fn check(&self, repo_name: &str, repo_url: &str) -> Result<RepoCoordinates, Rejection> {
        let coords = RepoCoordinates::parse(repo_url)
            .ok_or_else(|| Rejection::MalformedUrl(repo_url.to_string()))?;

        if !self.repositories.contains(repo_name) {
            return Err(Rejection::RepositoryNotAllowed(repo_name.to_string()));
        }
        if !self.accounts.contains(&coords.account) {
            return Err(Rejection::AccountNotAllowed(coords.account));
        }
        // The name becomes the clone directory; it must be the repo we clone.
        if coords.repository != repo_name {
            return Err(Rejection::NameMismatch {
                name: repo_name.to_string(),
                url_repository: coords.repository,
            });
        }

        Ok(coords)
    }

    pub fn is_allowed(&self, repo_name: &str, repo_url: &str) -> bool {
        self.check(repo_name, repo_url).is_ok()
    }
}
