//! Container runtime adapters.
//!
//! A runtime turns a case and its bind specification into an [`Invocation`]:
//! the program, its arguments, and the environment entries that apply to that
//! one child process only.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::case::CaseInput;
use crate::config::{GpuMode, RuntimeKind};
use crate::error::{Result, RunnerError};
use crate::mounts::{BindSpec, ContainerSpec};

/// Inherited variables that would add binds or inject environment into the
/// container. Both families are honoured by Apptainer.
const SCRUBBED_ENV_PREFIXES: &[&str] = &[
    "SINGULARITY_BIND",
    "SINGULARITYENV_",
    "APPTAINER_BIND",
    "APPTAINERENV_",
];

/// A fully specified child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Variables set on the child only.
    pub env: BTreeMap<String, String>,
    /// Inherited variables starting with any of these prefixes are dropped.
    pub scrub_env_prefixes: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            scrub_env_prefixes: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Shell-quoted command line, for progress output.
    pub fn command_line(&self) -> String {
        let program = self.program.to_string_lossy();
        let words: Vec<&str> = std::iter::once(program.as_ref())
            .chain(self.args.iter().map(String::as_str))
            .collect();
        shlex::try_join(words.iter().copied()).unwrap_or_else(|_| words.join(" "))
    }

    /// Whether an inherited variable must not reach the child.
    pub fn is_scrubbed(&self, key: &str) -> bool {
        self.scrub_env_prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }
}

/// What a runtime needs to know to build one invocation.
#[derive(Debug, Clone, Copy)]
pub struct InvocationRequest<'a> {
    pub container: &'a ContainerSpec,
    pub case: &'a CaseInput,
    pub binds: &'a BindSpec,
    pub gpu: bool,
}

/// A container runtime command-line contract.
pub trait ContainerRuntime: Send + Sync {
    /// Runtime name (e.g. "singularity").
    fn name(&self) -> &str;

    /// Build the isolated invocation for one case.
    fn build_invocation(&self, request: &InvocationRequest<'_>) -> Result<Invocation>;
}

/// Singularity / Apptainer `run` with a contained, network-less environment.
#[derive(Debug, Clone)]
pub struct SingularityRuntime {
    kind: RuntimeKind,
    program: PathBuf,
}

impl SingularityRuntime {
    /// Runtime of `kind`, using `program` or the default executable name.
    pub fn new(kind: RuntimeKind, program: Option<PathBuf>) -> Self {
        let program = program.unwrap_or_else(|| PathBuf::from(kind.as_str()));
        Self { kind, program }
    }

    /// Variable carrying the bind path.
    pub fn bind_env_var(&self) -> &'static str {
        match self.kind {
            RuntimeKind::Singularity => "SINGULARITY_BINDPATH",
            RuntimeKind::Apptainer => "APPTAINER_BINDPATH",
        }
    }
}

impl ContainerRuntime for SingularityRuntime {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn build_invocation(&self, request: &InvocationRequest<'_>) -> Result<Invocation> {
        let InvocationRequest {
            container,
            case,
            binds,
            gpu,
        } = *request;

        if binds.is_empty() {
            return Err(RunnerError::config("refusing to run without bind mounts"));
        }

        // --containall: no host home, /tmp or environment.
        let mut invocation = Invocation::new(&self.program)
            .arg("run")
            .arg("-C")
            .arg("--writable-tmpfs")
            .arg("--net")
            .arg("--network=none");
        if gpu {
            invocation = invocation.arg("--nv");
        }

        invocation = invocation
            .arg(container.image.to_string_lossy())
            .arg("-s")
            .arg(case.subject_id.as_str());
        for (modality, host) in case.images() {
            let target = container.container_input_path(host)?;
            invocation = invocation
                .arg(modality.container_flag())
                .arg(target.to_string_lossy());
        }
        invocation = invocation
            .arg("-o")
            .arg(container.output_root.to_string_lossy())
            .env(self.bind_env_var(), binds.to_bind_path());

        invocation.scrub_env_prefixes = SCRUBBED_ENV_PREFIXES.iter().map(|p| p.to_string()).collect();

        debug!(runtime = self.name(), gpu, "Built container invocation");
        Ok(invocation)
    }
}

/// Resolve a GPU policy against the current host.
pub fn gpu_enabled(mode: GpuMode) -> bool {
    match mode {
        GpuMode::On => true,
        GpuMode::Off => false,
        GpuMode::Auto => {
            let available =
                Path::new("/dev/nvidiactl").exists() || which::which("nvidia-smi").is_ok();
            debug!(available, "Probed NVIDIA driver");
            available
        }
    }
}
