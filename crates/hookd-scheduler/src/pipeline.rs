//! Build pipeline - runs the fixed sequence of build steps for one job.
//!
//! ```text
//! ENSURE_REPO -> FETCH -> CLEAN -> CHECKOUT -> BUILD -> DONE
//!      \           \        \         \          \
//!       +-----------+--------+---------+----------+--> FAILED
//! ```
//!
//! Each step runs one external command in the repository clone inside the
//! worker's workspace. The first failing step ends the run; nothing is rolled
//! back; the next job's CLEAN and CHECKOUT reset the clone.

use chrono::{DateTime, Utc};
use hookd_config::PipelineConfig;
use hookd_core::executor::{StepCommand, StepExecutor, StepStatus};
use hookd_core::{Error, Job, JobId, WorkerId};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// State of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    EnsureRepo,
    Fetch,
    Clean,
    Checkout,
    Build,
    Done,
    Failed,
}

impl PipelineState {
    pub const STEPS: [PipelineState; 5] = [
        PipelineState::EnsureRepo,
        PipelineState::Fetch,
        PipelineState::Clean,
        PipelineState::Checkout,
        PipelineState::Build,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// State reached when this step succeeds.
    pub fn next(self) -> Self {
        match self {
            PipelineState::EnsureRepo => PipelineState::Fetch,
            PipelineState::Fetch => PipelineState::Clean,
            PipelineState::Clean => PipelineState::Checkout,
            PipelineState::Checkout => PipelineState::Build,
            PipelineState::Build | PipelineState::Done => PipelineState::Done,
            PipelineState::Failed => PipelineState::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::EnsureRepo => "ensure_repo",
            PipelineState::Fetch => "fetch",
            PipelineState::Clean => "clean",
            PipelineState::Checkout => "checkout",
            PipelineState::Build => "build",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub job_id: JobId,
    /// Either `Done` or `Failed`.
    pub state: PipelineState,
    /// The step that failed. `None` on a failed run means no step ran
    /// because the build log could not be opened.
    pub failed_step: Option<PipelineState>,
    pub log_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Done
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// The run's outcome as a `Result`, for callers that log errors uniformly.
    pub fn outcome(&self) -> hookd_core::Result<()> {
        match self.failed_step {
            None if self.is_success() => Ok(()),
            None => Err(Error::Infrastructure(format!(
                "cannot open build log {}",
                self.log_path.display()
            ))),
            Some(step) => Err(Error::StepFailed {
                step: step.to_string(),
                message: format!("see {}", self.log_path.display()),
            }),
        }
    }
}

/// Per-job execution context, owned by the worker running it.
struct PipelineRun<'a> {
    job: &'a Job,
    worker: WorkerId,
    workspace: &'a Path,
    repo_dir: PathBuf,
    log: File,
    state: PipelineState,
}

impl PipelineRun<'_> {
    fn mark(&mut self, line: &str) {
        // Marker write failures are ignored.
        let _ = writeln!(self.log, "==> [{}] {}", self.state, line);
    }
}

/// Executes the build steps for jobs. Stateless and shared by all workers.
pub struct BuildPipeline {
    executor: Arc<dyn StepExecutor>,
    config: PipelineConfig,
}

impl BuildPipeline {
    pub fn new(executor: Arc<dyn StepExecutor>, config: PipelineConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Build log location for a job run by the given worker.
    ///
    /// `<log_dir>/<worker>_build_<repo>_<commit>.log`
    pub fn log_path(&self, worker: WorkerId, job: &Job) -> PathBuf {
        self.config.log_dir.join(format!(
            "{}_build_{}_{}.log",
            worker,
            file_component(&job.repo_name),
            file_component(&job.commit_id)
        ))
    }

    /// Run every step for `job` inside `workspace`, stopping at the first failure.
    ///
    /// Never returns an error: failures are contained in the report.
    pub fn execute(&self, worker: WorkerId, workspace: &Path, job: &Job) -> PipelineReport {
        let started_at = Utc::now();
        let log_path = self.log_path(worker, job);

        let report = |state, failed_step| PipelineReport {
            job_id: job.id,
            state,
            failed_step,
            log_path: log_path.clone(),
            started_at,
            finished_at: Utc::now(),
        };

        let log = match OpenOptions::new().create(true).append(true).open(&log_path) {
            Ok(log) => log,
            Err(e) => {
                error!(
                    worker = %worker,
                    job_id = %job.id,
                    path = %log_path.display(),
                    error = %e,
                    "Cannot open build log"
                );
                return report(PipelineState::Failed, None);
            }
        };

        let mut run = PipelineRun {
            job,
            worker,
            workspace,
            repo_dir: workspace.join(&job.repo_name),
            log,
            state: PipelineState::EnsureRepo,
        };
        let mut failed_step = None;

        while !run.state.is_terminal() {
            let step = run.state;
            if self.run_step(&mut run) {
                run.state = step.next();
            } else {
                info!(
                    worker = %worker,
                    job_id = %job.id,
                    step = %step,
                    "A build step failed, aborting"
                );
                failed_step = Some(step);
                run.state = PipelineState::Failed;
            }
        }

        let state = run.state;
        // Closes the log before the worker moves on.
        drop(run);

        let report = report(state, failed_step);
        info!(
            worker = %worker,
            job_id = %job.id,
            repo = %job.repo_name,
            commit = %job.short_commit(),
            state = %report.state,
            duration_ms = report.duration().num_milliseconds(),
            log = %report.log_path.display(),
            "Pipeline finished"
        );
        report
    }

    /// Run the current step. Returns whether it succeeded.
    fn run_step(&self, run: &mut PipelineRun<'_>) -> bool {
        if run.state == PipelineState::EnsureRepo && run.repo_dir.is_dir() {
            info!(
                worker = %run.worker,
                dir = %run.repo_dir.display(),
                "Repository directory already exists"
            );
            let line = format!("reusing {}", run.repo_dir.display());
            run.mark(&line);
            return true;
        }

        let Some(command) = self.command_for(run) else {
            error!(worker = %run.worker, step = %run.state, "No command configured for step");
            return false;
        };

        run.mark(&command.display());

        match self.executor.run(&command, &run.log) {
            Ok(StepStatus::Succeeded) => true,
            Ok(StepStatus::Failed { exit_code }) => {
                info!(
                    worker = %run.worker,
                    job_id = %run.job.id,
                    command = %command.display(),
                    ?exit_code,
                    "Step returned failure"
                );
                false
            }
            Err(e) => {
                error!(
                    worker = %run.worker,
                    job_id = %run.job.id,
                    command = %command.display(),
                    error = %e,
                    "Step could not be started"
                );
                let line = format!("failed to start: {}", e);
                run.mark(&line);
                false
            }
        }
    }

    fn command_for(&self, run: &PipelineRun<'_>) -> Option<StepCommand> {
        let git = |args: &[&str]| {
            StepCommand::new(&self.config.git, &run.repo_dir).args(args.iter().copied())
        };

        match run.state {
            PipelineState::EnsureRepo => Some(
                StepCommand::new(&self.config.git, run.workspace)
                    .arg("clone")
                    .arg(&run.job.repo_url)
                    .arg(&run.job.repo_name),
            ),
            PipelineState::Fetch => Some(git(&["fetch"])),
            PipelineState::Clean => Some(git(&["clean", "-f"])),
            PipelineState::Checkout => Some(git(&["checkout", run.job.commit_id.as_str()])),
            PipelineState::Build => {
                let (program, args) = self.config.build.split_first()?;
                Some(StepCommand::new(program, &run.repo_dir).args(args.iter().cloned()))
            }
            PipelineState::Done | PipelineState::Failed => None,
        }
    }
}

/// Restrict a value to characters that are safe in a file name.
fn file_component(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingExecutor, job, pipeline_config};
    use std::fs;

    fn setup(executor: RecordingExecutor) -> (tempfile::TempDir, Arc<RecordingExecutor>, BuildPipeline) {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(executor);
        let pipeline = BuildPipeline::new(executor.clone(), pipeline_config(dir.path()));
        (dir, executor, pipeline)
    }

    fn workspace(dir: &tempfile::TempDir) -> PathBuf {
        let ws = dir.path().join("worker0_workspace");
        fs::create_dir_all(&ws).unwrap();
        ws
    }

    #[test]
    fn test_state_order() {
        let mut state = PipelineState::EnsureRepo;
        let mut seen = vec![state];
        while !state.is_terminal() {
            state = state.next();
            seen.push(state);
        }
        let mut expected = PipelineState::STEPS.to_vec();
        expected.push(PipelineState::Done);
        assert_eq!(seen, expected);
        assert_eq!(PipelineState::Failed.next(), PipelineState::Failed);
    }

    #[test]
    fn test_full_run_clones_then_builds() {
        let (dir, executor, pipeline) = setup(RecordingExecutor::new());
        let ws = workspace(&dir);

        let report = pipeline.execute(WorkerId::new(0), &ws, &job("abc123"));

        assert!(report.is_success());
        assert!(report.outcome().is_ok());
        assert_eq!(report.failed_step, None);
        assert_eq!(
            executor.commands(),
            vec![
                "git clone https://github.com/openplans/hookd hookd",
                "git fetch",
                "git clean -f",
                "git checkout abc123",
                "mvn clean package",
            ]
        );

        let calls = executor.calls();
        assert_eq!(calls[0].command.working_dir, ws);
        assert!(calls[1..].iter().all(|c| c.command.working_dir == ws.join("hookd")));
    }

    #[test]
    fn test_existing_clone_is_reused() {
        let (dir, executor, pipeline) = setup(RecordingExecutor::new());
        let ws = workspace(&dir);

        pipeline.execute(WorkerId::new(0), &ws, &job("abc123"));
        let report = pipeline.execute(WorkerId::new(0), &ws, &job("def456"));

        assert!(report.is_success());
        let clones = executor
            .commands()
            .iter()
            .filter(|c| c.starts_with("git clone"))
            .count();
        assert_eq!(clones, 1);
    }

    #[test]
    fn test_checkout_failure_skips_build() {
        let (dir, executor, pipeline) =
            setup(RecordingExecutor::new().failing_on("git checkout"));
        let ws = workspace(&dir);

        let report = pipeline.execute(WorkerId::new(0), &ws, &job("abc123"));

        assert_eq!(report.state, PipelineState::Failed);
        assert_eq!(report.failed_step, Some(PipelineState::Checkout));
        assert!(matches!(report.outcome(), Err(Error::StepFailed { step, .. }) if step == "checkout"));
        let commands = executor.commands();
        assert_eq!(commands.last().unwrap(), "git checkout abc123");
        assert!(!commands.iter().any(|c| c.starts_with("mvn")));
    }

    #[test]
    fn test_clone_failure_runs_nothing_else() {
        let (dir, executor, pipeline) = setup(RecordingExecutor::new().failing_on("git clone"));
        let ws = workspace(&dir);

        let report = pipeline.execute(WorkerId::new(0), &ws, &job("abc123"));

        assert_eq!(report.failed_step, Some(PipelineState::EnsureRepo));
        assert_eq!(executor.commands().len(), 1);
        assert!(!ws.join("hookd").exists());
    }

    #[test]
    fn test_unstartable_command_fails_the_step() {
        let (dir, executor, pipeline) = setup(RecordingExecutor::new().erroring_on("git fetch"));
        let ws = workspace(&dir);

        let report = pipeline.execute(WorkerId::new(0), &ws, &job("abc123"));

        assert_eq!(report.failed_step, Some(PipelineState::Fetch));
        assert_eq!(executor.commands().len(), 2);
    }

    #[test]
    fn test_failed_run_leaves_workspace_for_next_job() {
        let (dir, executor, pipeline) = setup(RecordingExecutor::new().failing_on("abc123"));
        let ws = workspace(&dir);

        let failed = pipeline.execute(WorkerId::new(0), &ws, &job("abc123"));
        assert!(!failed.is_success());

        let next = pipeline.execute(WorkerId::new(0), &ws, &job("def456"));
        assert!(next.is_success());
        assert!(ws.join("hookd").is_dir());
        assert_eq!(executor.commands().last().unwrap(), "mvn clean package");
    }

    #[test]
    fn test_log_file_named_from_worker_repo_and_commit() {
        let (dir, _executor, pipeline) = setup(RecordingExecutor::new());
        let ws = workspace(&dir);

        let report = pipeline.execute(WorkerId::new(1), &ws, &job("abc123"));

        assert_eq!(
            report.log_path,
            dir.path().join("worker1_build_hookd_abc123.log")
        );
        let log = fs::read_to_string(&report.log_path).unwrap();
        assert!(log.contains("==> [ensure_repo] git clone"));
        assert!(log.contains("==> [build] mvn clean package"));
    }

    #[test]
    fn test_log_is_appended_across_runs() {
        let (dir, _executor, pipeline) = setup(RecordingExecutor::new());
        let ws = workspace(&dir);

        let first = pipeline.execute(WorkerId::new(0), &ws, &job("abc123"));
        let second = pipeline.execute(WorkerId::new(0), &ws, &job("abc123"));
        assert_eq!(first.log_path, second.log_path);

        let log = fs::read_to_string(&second.log_path).unwrap();
        assert_eq!(log.matches("==> [build]").count(), 2);
    }

    #[test]
    fn test_unwritable_log_dir_fails_before_any_step() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(RecordingExecutor::new());
        let pipeline = BuildPipeline::new(
            executor.clone(),
            pipeline_config(&dir.path().join("no-such-dir")),
        );
        let ws = workspace(&dir);

        let report = pipeline.execute(WorkerId::new(0), &ws, &job("abc123"));

        assert_eq!(report.state, PipelineState::Failed);
        assert_eq!(report.failed_step, None);
        assert!(matches!(report.outcome(), Err(Error::Infrastructure(_))));
        assert!(executor.commands().is_empty());
    }

    #[test]
    fn test_file_component() {
        assert_eq!(file_component("hookd"), "hookd");
        assert_eq!(file_component("../etc"), ".._etc");
        assert_eq!(file_component("a b/c"), "a_b_c");
    }
}
