//! Error types for the case runner.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Process exit code reported when the per-case timeout is reached.
pub const EXIT_TIMEOUT: i32 = 1;
/// Process exit code for missing or invalid arguments.
pub const EXIT_CONFIGURATION: i32 = 2;
/// Process exit code when a bound path would expose ground truth.
pub const EXIT_SAFETY_VIOLATION: i32 = 3;
/// Process exit code when the submission container exited non-zero.
pub const EXIT_SUBMISSION_FAILURE: i32 = 4;
/// Process exit code for platform-side failures (runtime missing, I/O).
pub const EXIT_PLATFORM: i32 = 5;

/// Main error type for a case run.
#[derive(Debug, Error)]
pub enum RunnerError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Input file not found for {field}: {path}")]
    InputNotFound { field: &'static str, path: PathBuf },

    #[error("Input for {field} is not a regular file: {path}")]
    NotAFile { field: &'static str, path: PathBuf },

    #[error("Output directory is not writable: {path}: {message}")]
    OutputNotWritable { path: PathBuf, message: String },

    // Safety errors
    #[error("Unsafe input: container must not have access to segmentation file {path}")]
    SafetyViolation { path: PathBuf },

    // Execution errors
    #[error("Container runtime '{program}' could not be started: {message}")]
    RuntimeUnavailable { program: String, message: String },

    #[error("Running container failed with {}: {stderr}", describe_code(.code))]
    SubmissionFailure {
        code: Option<i32>,
        elapsed: Duration,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {code}"),
        None => "termination by signal".to_string(),
    }
}

impl RunnerError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_)
            | Self::InputNotFound { .. }
            | Self::NotAFile { .. }
            | Self::OutputNotWritable { .. } => "configuration_error",
            Self::SafetyViolation { .. } => "safety_violation",
            Self::SubmissionFailure { .. } => "submission_failure",
            Self::RuntimeUnavailable { .. } | Self::Io(_) => "platform_error",
        }
    }

    /// Process exit code the CLI reports for this error.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            "configuration_error" => EXIT_CONFIGURATION,
            "safety_violation" => EXIT_SAFETY_VIOLATION,
            "submission_failure" => EXIT_SUBMISSION_FAILURE,
            _ => EXIT_PLATFORM,
        }
    }

    /// Whether the failure was caused by the submission rather than the platform.
    pub fn is_submission_fault(&self) -> bool {
        matches!(self, Self::SubmissionFailure { .. })
    }
}
