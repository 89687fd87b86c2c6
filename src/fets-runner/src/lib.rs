//! FeTS case runner.
//!
//! Runs an untrusted submission container against one test case: four MRI
//! images bound read-only, one output directory bound read-write, no network,
//! and a hard per-case time budget.
//!
//! # Architecture
//!
//! ```text
//! CaseInput ──▶ SegmentationGuard ──▶ BindSpec ──▶ ContainerRuntime ──▶ Invocation
//!                                                                        │
//!                                          RunResult ◀── ProcessExecutor ◀┘
//! ```
//!
//! - [`case`]: subject and modality paths
//! - [`guard`]: refuses to expose segmentation files
//! - [`mounts`]: bind-mount specification and container mount points
//! - [`runtime`]: Singularity/Apptainer command-line contract
//! - [`exec`]: timeout-bounded process execution
//! - [`runner`]: the [`CaseRunner`] tying it together
//! - [`report`]: progress and result output
//! - [`config`]: run configuration and the TOML config file
//!
//! # Example
//!
//! ```rust,ignore
//! use fets_runner::{CaseInput, CaseRunner, ContainerSpec, OutputLocation, RunConfig};
//!
//! let runner = CaseRunner::from_config(ContainerSpec::new("team.sif"), RunConfig::default())?;
//! let case = CaseInput::new("FeTS_001", t1, t1c, t2, flair);
//! let result = runner.run(&case, &OutputLocation::new("/results/FeTS_001")).await?;
//! println!("{:.2} s", result.elapsed.as_secs_f64());
//! ```

pub mod case;
pub mod config;
pub mod error;
pub mod exec;
pub mod guard;
pub mod mounts;
pub mod report;
pub mod runner;
pub mod runtime;


pub use case::{CaseInput, Modality};
pub use config::{ConfigFile, DEFAULT_TIMEOUT, GpuMode, RunConfig, RuntimeKind};
pub use error::{Result, RunnerError};
pub use exec::{ChildOutput, ExecOutcome, ProcessExecutor, TokioExecutor};
pub use guard::SegmentationGuard;
pub use mounts::{BindAccess, BindMount, BindSpec, ContainerSpec, OutputLocation};
pub use report::{OutputFormat, Reporter};
pub use runner::{CaseRunner, PreparedRun, RunResult, RunState, RunStatus};
pub use runtime::{ContainerRuntime, Invocation, InvocationRequest, SingularityRuntime};
