//! Timeout-bounded process execution.

use std::collections::{BTreeMap, VecDeque};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tracing::{debug, warn};

use crate::error::{Result, RunnerError};
use crate::runtime::Invocation;

/// Number of trailing stderr lines kept for error reports.
pub const STDERR_TAIL_LINES: usize = 20;

/// How long to keep draining stderr after the child has exited.
const STDERR_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Patterns in variable names that indicate sensitive data (case-insensitive).
/// These will be excluded from the environment passed to child processes.
const SENSITIVE_PATTERNS: &[&str] = &[
    "KEY",        // API_KEY, SSH_KEY, etc.
    "SECRET",     // AWS_SECRET, etc.
    "TOKEN",      // AUTH_TOKEN, etc.
    "PASSWORD",   // DB_PASSWORD, etc.
    "CREDENTIAL", // GOOGLE_CREDENTIALS, etc.
    "PRIVATE",    // PRIVATE_KEY, etc.
];

/// How a child process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The process exited on its own (or was killed by a signal it did not
    /// receive from us).
    Exited {
        code: Option<i32>,
        elapsed: Duration,
        stderr_tail: String,
    },
    /// The budget ran out and the process group was killed.
    TimedOut { elapsed: Duration },
}

/// Runs one invocation to completion or timeout.
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    async fn execute(&self, invocation: &Invocation, timeout: Duration) -> Result<ExecOutcome>;
}

/// Where the child's standard output goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChildOutput {
    /// Share our stdout.
    #[default]
    Inherit,
    /// Send to our stderr, keeping stdout for machine-readable output.
    Stderr,
    Discard,
}

/// Executor backed by `tokio::process`.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    stdout: ChildOutput,
    echo_stderr: bool,
}

impl TokioExecutor {
    pub fn new() -> Self {
        Self {
            stdout: ChildOutput::Inherit,
            echo_stderr: true,
        }
    }

    pub fn with_stdout(mut self, stdout: ChildOutput) -> Self {
        self.stdout = stdout;
        self
    }

    /// Whether captured stderr lines are echoed to our stderr as they arrive.
    pub fn with_echo_stderr(mut self, echo: bool) -> Self {
        self.echo_stderr = echo;
        self
    }

    fn stdout_stdio(&self) -> Stdio {
        match self.stdout {
            ChildOutput::Inherit => Stdio::inherit(),
            ChildOutput::Stderr => Stdio::from(std::io::stderr()),
            ChildOutput::Discard => Stdio::null(),
        }
    }
}

impl Default for TokioExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessExecutor for TokioExecutor {
    async fn execute(&self, invocation: &Invocation, timeout: Duration) -> Result<ExecOutcome> {
        let program = invocation.program.to_string_lossy().into_owned();

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(self.stdout_stdio())
            .stderr(Stdio::piped())
            .kill_on_drop(true); // Clean up child process if we're dropped

        // The child sees the filtered parent environment plus its own entries.
        cmd.env_clear();
        let parent = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
        cmd.envs(build_child_environment(invocation, parent));

        // Unix-specific: set up process group isolation
        #[cfg(unix)]
        {
            #[allow(unused_imports)]
            use std::os::unix::process::CommandExt;
            // SAFETY: setpgid only changes process group, no undefined behavior
            unsafe {
                cmd.pre_exec(|| {
                    // Put child in its own process group for clean termination
                    if libc::setpgid(0, 0) == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| RunnerError::RuntimeUnavailable {
            program: program.clone(),
            message: e.to_string(),
        })?;
        let pid = child.id();
        debug!(program = %program, pid, "Spawned container runtime");

        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(collect_stderr(stderr, self.echo_stderr)));

        let waited = tokio::time::timeout(timeout, child.wait()).await;
        match waited {
            Ok(status) => {
                let status = status?;
                let elapsed = start.elapsed();
                // A detached grandchild may hold stderr open past our child.
                let stderr_tail = match stderr_task {
                    Some(task) => match tokio::time::timeout(STDERR_DRAIN_GRACE, task).await {
                        Ok(joined) => joined.unwrap_or_default(),
                        Err(_) => String::new(),
                    },
                    None => String::new(),
                };
                Ok(ExecOutcome::Exited {
                    code: status.code(),
                    elapsed,
                    stderr_tail,
                })
            }
            Err(_) => {
                warn!(pid, timeout_secs = timeout.as_secs(), "Timeout reached, killing process group");
                #[cfg(unix)]
                {
                    if let Some(pid) = pid {
                        kill_process_group(pid);
                    }
                }
                // kill() also reaps the child.
                if let Err(e) = child.kill().await {
                    debug!("Child already gone after group kill: {e}");
                }
                if let Some(task) = stderr_task {
                    task.abort();
                }
                Ok(ExecOutcome::TimedOut {
                    elapsed: start.elapsed(),
                })
            }
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg has no memory-safety preconditions.
    let result = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if result != 0 {
        debug!(
            "killpg({pgid}) failed: {}",
            std::io::Error::last_os_error()
        );
    }
}

/// Read stderr to the end, optionally echoing it, and return the last lines.
async fn collect_stderr(stderr: ChildStderr, echo: bool) -> String {
    let mut reader = BufReader::new(stderr);
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if echo {
                    eprintln!("{line}");
                }
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Err(e) => {
                debug!("Stopped reading container stderr: {e}");
                break;
            }
        }
    }

    Vec::from(tail).join("\n")
}

/// Build the child environment from `parent`, dropping credentials and any
/// variable the invocation scrubs, then adding the invocation's own entries.
pub fn build_child_environment(
    invocation: &Invocation,
    parent: impl IntoIterator<Item = (String, String)>,
) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = parent
        .into_iter()
        .filter(|(key, _)| !is_sensitive_env_var(key) && !invocation.is_scrubbed(key))
        .collect();
    env.extend(invocation.env.clone());
    env
}

fn is_sensitive_env_var(name: &str) -> bool {
    let upper = name.to_uppercase();
    SENSITIVE_PATTERNS.iter().any(|p| upper.contains(p))
}
