//! Core domain types and traits for the hookd build daemon.
//!
//! This crate contains:
//! - Job and worker identifiers
//! - Commit notifications and the jobs built from them
//! - The repository/account allow-list
//! - The step executor trait used by the build pipeline

pub mod allowlist;
pub mod error;
pub mod executor;
pub mod id;
pub mod job;

pub use allowlist::{AllowList, Rejection, RepoCoordinates};
pub use error::{Error, Result};
pub use id::{JobId, WorkerId};
pub use job::{Job, Notification};
