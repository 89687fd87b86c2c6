//! The case runner.
//!
//! Lifecycle of one run:
//!
//! ```text
//! NotStarted ──prepare──▶ Running ──▶ Succeeded
//!                                 ├──▶ Failed
//!                                 └──▶ TimedOut
//! ```
//!
//! All precondition checks happen in [`CaseRunner::prepare`]; nothing is
//! spawned until they pass.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::case::CaseInput;
use crate::config::RunConfig;
use crate::error::{EXIT_SUBMISSION_FAILURE, EXIT_TIMEOUT, Result, RunnerError};
use crate::exec::{ExecOutcome, ProcessExecutor, TokioExecutor};
use crate::guard::SegmentationGuard;
use crate::mounts::{BindSpec, ContainerSpec, OutputLocation};
use crate::runtime::{ContainerRuntime, Invocation, InvocationRequest, SingularityRuntime, gpu_enabled};

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::NotStarted => "not_started",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
            RunState::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

/// Final classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    /// Exited non-zero; `code` is `None` when killed by a signal.
    Failed { code: Option<i32> },
    TimedOut,
}

impl RunStatus {
    pub fn state(&self) -> RunState {
        match self {
            RunStatus::Succeeded => RunState::Succeeded,
            RunStatus::Failed { .. } => RunState::Failed,
            RunStatus::TimedOut => RunState::TimedOut,
        }
    }
}

/// Outcome of one container run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub subject_id: String,
    pub status: RunStatus,
    /// Wall-clock time; equals the timeout for timed-out runs.
    pub elapsed: Duration,
    /// Trailing stderr of a failed run.
    pub error: Option<String>,
    pub command_line: String,
    pub bind_path_len: usize,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Process exit code for this result.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Succeeded => 0,
            RunStatus::TimedOut => EXIT_TIMEOUT,
            RunStatus::Failed { .. } => EXIT_SUBMISSION_FAILURE,
        }
    }

    /// Turn a failed run into a [`RunnerError::SubmissionFailure`].
    ///
    /// Timeouts stay results: slow submissions are expected.
    pub fn into_checked(self) -> Result<Self> {
        match self.status {
            RunStatus::Failed { code } => Err(RunnerError::SubmissionFailure {
                code,
                elapsed: self.elapsed,
                stderr: self.error.unwrap_or_default(),
            }),
            _ => Ok(self),
        }
    }
}

/// A run that passed every precondition and is ready to spawn.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub subject_id: String,
    pub binds: BindSpec,
    pub invocation: Invocation,
}

impl PreparedRun {
    /// Length of the rendered bind path.
    pub fn bind_path_len(&self) -> usize {
        self.binds.to_bind_path().len()
    }
}

/// Runs a submission container against single cases.
///
/// Holds no per-run state, so one runner can serve any number of cases.
pub struct CaseRunner<R = SingularityRuntime, E = TokioExecutor> {
    container: ContainerSpec,
    config: RunConfig,
    runtime: R,
    executor: E,
    guard: SegmentationGuard,
}

impl CaseRunner<SingularityRuntime, TokioExecutor> {
    /// Runner using the configured Singularity/Apptainer binary.
    pub fn from_config(container: ContainerSpec, config: RunConfig) -> Result<Self> {
        let runtime = SingularityRuntime::new(config.runtime, config.runtime_path.clone());
        Self::new(container, config, runtime, TokioExecutor::new())
    }
}

impl<R: ContainerRuntime, E: ProcessExecutor> CaseRunner<R, E> {
    pub fn new(container: ContainerSpec, config: RunConfig, runtime: R, executor: E) -> Result<Self> {
        let guard = SegmentationGuard::with_extra_patterns(&config.extra_segmentation_patterns)?;
        Ok(Self {
            container,
            config,
            runtime,
            executor,
            guard,
        })
    }

    /// Validate inputs, build the binds and the invocation.
    pub fn prepare(&self, case: &CaseInput, output: &OutputLocation) -> Result<PreparedRun> {
        // Names first, so a label file is reported as unsafe even if missing.
        for (_, path) in case.images() {
            self.guard.check_path(path)?;
        }
        case.validate()?;
        self.container.validate()?;

        let binds = BindSpec::for_case(case, output, &self.container)?;
        self.guard.check_binds(&binds)?;
        output.prepare()?;

        let invocation = self.runtime.build_invocation(&InvocationRequest {
            container: &self.container,
            case,
            binds: &binds,
            gpu: gpu_enabled(self.config.gpu),
        })?;

        debug!(subject = %case.subject_id, state = %RunState::NotStarted, "Run prepared");
        Ok(PreparedRun {
            subject_id: case.subject_id.clone(),
            binds,
            invocation,
        })
    }

    /// Spawn a prepared run and classify how it ended.
    pub async fn execute(&self, prepared: &PreparedRun) -> Result<RunResult> {
        let timeout = self.config.timeout;
        info!(
            subject = %prepared.subject_id,
            runtime = self.runtime.name(),
            timeout_secs = timeout.as_secs(),
            state = %RunState::Running,
            "Running container"
        );

        let outcome = self.executor.execute(&prepared.invocation, timeout).await?;
        let (status, elapsed, error) = match outcome {
            ExecOutcome::Exited {
                code: Some(0),
                elapsed,
                ..
            } => (RunStatus::Succeeded, elapsed, None),
            ExecOutcome::Exited {
                code,
                elapsed,
                stderr_tail,
            } => (RunStatus::Failed { code }, elapsed, Some(stderr_tail)),
            ExecOutcome::TimedOut { .. } => (RunStatus::TimedOut, timeout, None),
        };

        match status {
            RunStatus::Succeeded => info!(
                subject = %prepared.subject_id,
                elapsed_secs = elapsed.as_secs_f64(),
                state = %status.state(),
                "Container finished"
            ),
            _ => warn!(
                subject = %prepared.subject_id,
                elapsed_secs = elapsed.as_secs_f64(),
                state = %status.state(),
                "Container did not finish successfully"
            ),
        }

        Ok(RunResult {
            subject_id: prepared.subject_id.clone(),
            status,
            elapsed,
            error,
            command_line: prepared.invocation.command_line(),
            bind_path_len: prepared.bind_path_len(),
        })
    }

    /// Prepare and execute one case, turning a non-zero exit into
    /// [`RunnerError::SubmissionFailure`].
    pub async fn run(&self, case: &CaseInput, output: &OutputLocation) -> Result<RunResult> {
        let prepared = self.prepare(case, output)?;
        self.execute(&prepared).await?.into_checked()
    }
}
