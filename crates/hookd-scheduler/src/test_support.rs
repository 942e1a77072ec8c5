//! Shared fixtures for scheduler tests.

use hookd_config::PipelineConfig;
use hookd_core::executor::{StepCommand, StepExecutor, StepStatus};
use hookd_core::{Job, Notification};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

pub(crate) fn job(commit: &str) -> Job {
    Job::from_notification(notification(commit))
}

pub(crate) fn notification(commit: &str) -> Notification {
    Notification::new("hookd", "https://github.com/openplans/hookd", commit)
}

pub(crate) fn pipeline_config(log_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        log_dir: log_dir.to_path_buf(),
        ..PipelineConfig::default()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub command: StepCommand,
    pub started: Instant,
    pub finished: Instant,
}

/// Blocks build steps until the test releases them.
pub(crate) struct Gate {
    started: Sender<String>,
    release: Mutex<Receiver<()>>,
}

/// Test-side ends of a [`Gate`].
pub(crate) struct GateControl {
    pub started: Receiver<String>,
    pub release: Sender<()>,
}

/// Executor that records every command instead of running it.
///
/// Successful `git clone` calls create the target directory so later runs
/// see an existing clone.
pub(crate) struct RecordingExecutor {
    calls: Mutex<Vec<RecordedCall>>,
    fail_on: Option<String>,
    error_on: Option<String>,
    delay: Duration,
    gate: Option<Gate>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: None,
            error_on: None,
            delay: Duration::ZERO,
            gate: None,
        }
    }

    /// Commands whose command line contains `pattern` exit with status 1.
    pub fn failing_on(mut self, pattern: &str) -> Self {
        self.fail_on = Some(pattern.to_string());
        self
    }

    /// Commands whose command line contains `pattern` cannot be started.
    pub fn erroring_on(mut self, pattern: &str) -> Self {
        self.error_on = Some(pattern.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make build steps wait for a release signal.
    pub fn gated(mut self) -> (Self, GateControl) {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        self.gate = Some(Gate {
            started: started_tx,
            release: Mutex::new(release_rx),
        });
        (
            self,
            GateControl {
                started: started_rx,
                release: release_tx,
            },
        )
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.command.display()).collect()
    }

    fn matches(pattern: &Option<String>, line: &str) -> bool {
        pattern.as_deref().is_some_and(|p| line.contains(p))
    }
}

impl StepExecutor for RecordingExecutor {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn run(&self, command: &StepCommand, _log: &File) -> hookd_core::Result<StepStatus> {
        let started = Instant::now();
        let line = command.display();

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if let Some(gate) = &self.gate {
            if command.program == "mvn" {
                let _ = gate.started.send(command.working_dir.display().to_string());
                let _ = gate.release.lock().unwrap().recv();
            }
        }

        let result = if Self::matches(&self.error_on, &line) {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such program").into())
        } else if Self::matches(&self.fail_on, &line) {
            Ok(StepStatus::Failed { exit_code: Some(1) })
        } else {
            if command.args.first().map(String::as_str) == Some("clone") {
                if let Some(target) = command.args.get(2) {
                    fs::create_dir_all(command.working_dir.join(target))?;
                }
            }
            Ok(StepStatus::Succeeded)
        };

        self.calls.lock().unwrap().push(RecordedCall {
            command: command.clone(),
            started,
            finished: Instant::now(),
        });
        result
    }
}
