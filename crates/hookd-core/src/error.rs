//! Error types for hookd.

use thiserror::Error;

use crate::allowlist::Rejection;

#[derive(Debug, Error)]
pub enum Error {
    #[error("notification rejected: {0}")]
    Validation(#[from] Rejection),

    #[error("step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
