//! Executor trait and build step types.
//!
//! Executors run one external command of the build pipeline to completion,
//! sending its combined output to the build log of the current run.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::PathBuf;

use crate::Result;

/// A single external command to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCommand {
    /// Program to execute.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Directory the command runs in.
    pub working_dir: PathBuf,
}

impl StepCommand {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The command line as it would be typed into a shell.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Outcome of a command that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Succeeded,
    Failed { exit_code: Option<i32> },
}

impl StepStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, StepStatus::Succeeded)
    }
}

/// Trait for build step executors.
///
/// `run` blocks the calling thread until the command exits. There is no
/// timeout. An `Err` means the command could not be started at all.
pub trait StepExecutor: Send + Sync {
    /// Name of this executor.
    fn name(&self) -> &'static str;

    /// Run a command, appending its stdout and stderr to `log`.
    fn run(&self, command: &StepCommand, log: &File) -> Result<StepStatus>;
}
