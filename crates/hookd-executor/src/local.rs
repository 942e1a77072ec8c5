//! Local process executor.
//!
//! Runs each step as a child process in the step's working directory, with
//! stdout and stderr both redirected into the run's build log. Blocks the
//! calling worker thread until the child exits.

use hookd_core::Result;
use hookd_core::executor::{StepCommand, StepExecutor, StepStatus};
use std::fs::File;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Executor that spawns commands on the local machine.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl StepExecutor for ProcessExecutor {
    fn name(&self) -> &'static str {
        "process"
    }

    fn run(&self, command: &StepCommand, log: &File) -> Result<StepStatus> {
        info!(
            command = %command.display(),
            dir = %command.working_dir.display(),
            "Running step"
        );

        let stdout = log.try_clone()?;
        let stderr = log.try_clone()?;

        let status = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()?;

        let result = if status.success() {
            StepStatus::Succeeded
        } else {
            StepStatus::Failed {
                exit_code: status.code(),
            }
        };

        debug!(command = %command.display(), ?result, "Step exited");
        info!(
            command = %command.display(),
            result = if result.is_success() { "OK" } else { "FAIL" },
            "Step finished"
        );

        Ok(result)
    }
}
