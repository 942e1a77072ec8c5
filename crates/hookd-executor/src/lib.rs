//! Build step execution backends for the hookd build daemon.
//!
//! Provides implementations of the `StepExecutor` trait:
//! - `ProcessExecutor`: runs each step as a local child process

pub mod local;

pub use hookd_core::executor::*;
pub use local::ProcessExecutor;
