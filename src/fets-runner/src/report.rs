//! Progress and result reporting on stdout.
//!
//! Text output is for humans reading platform logs. JSON output is a single
//! object printed once the run is over.

use serde_json::json;

use crate::error::RunnerError;
use crate::runner::{PreparedRun, RunResult, RunStatus};

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Plain text progress lines.
    #[default]
    Text,
    /// One JSON report object.
    Json,
}

/// Writes progress lines and the final report.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    format: OutputFormat,
}

impl Reporter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Announce a prepared run before it starts.
    pub fn write_prepared(&self, prepared: &PreparedRun) {
        if self.format == OutputFormat::Text {
            println!(
                "The bind path string is in total {} characters long.",
                prepared.bind_path_len()
            );
            println!("\nRunning container...");
            println!("{}", prepared.invocation.command_line());
        }
    }

    /// Report a finished run.
    pub fn write_result(&self, result: &RunResult) {
        match self.format {
            OutputFormat::Text => println!("{}", text_summary(result)),
            OutputFormat::Json => println!("{}", render_json(&result_json(result))),
        }
    }

    /// Report a run that never produced a result.
    pub fn write_error(&self, subject_id: Option<&str>, err: &RunnerError) {
        match self.format {
            OutputFormat::Text => {
                eprintln!("[ERROR] {err}");
            }
            OutputFormat::Json => println!("{}", render_json(&error_json(subject_id, err))),
        }
    }
}

fn render_json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// One-line human summary of a result.
pub fn text_summary(result: &RunResult) -> String {
    match result.status {
        RunStatus::Succeeded => format!(
            "Execution time of the container: {:.2} s",
            result.elapsed.as_secs_f64()
        ),
        RunStatus::TimedOut => format!(
            "Timeout of {} s reached. Aborting...",
            result.elapsed.as_secs()
        ),
        RunStatus::Failed { code } => match code {
            Some(code) => format!("Running container failed with exit status {code}"),
            None => "Running container failed: terminated by signal".to_string(),
        },
    }
}

/// JSON report of a finished run.
pub fn result_json(result: &RunResult) -> serde_json::Value {
    let mut value = json!({
        "subject_id": result.subject_id,
        "status": result.status.state().to_string(),
        "elapsed_secs": result.elapsed.as_secs_f64(),
        "exit_code": result.exit_code(),
        "command": result.command_line,
        "bind_path_len": result.bind_path_len,
    });
    if let RunStatus::Failed { code } = result.status {
        value["container_exit_code"] = json!(code);
    }
    if let Some(error) = &result.error {
        value["error"] = json!(error);
    }
    value
}

/// JSON report of a run that failed before or instead of producing a result.
pub fn error_json(subject_id: Option<&str>, err: &RunnerError) -> serde_json::Value {
    let mut value = json!({
        "subject_id": subject_id,
        "error_kind": err.kind(),
        "error": err.to_string(),
        "exit_code": err.exit_code(),
    });
    if let RunnerError::SubmissionFailure { code, elapsed, .. } = err {
        value["container_exit_code"] = json!(code);
        value["elapsed_secs"] = json!(elapsed.as_secs_f64());
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(status: RunStatus, elapsed: Duration) -> RunResult {
        RunResult {
            subject_id: "FeTS_001".into(),
            status,
            elapsed,
            error: None,
            command_line: "singularity run team.sif".into(),
            bind_path_len: 42,
        }
    }

    #[test]
    fn test_text_summary() {
        assert_eq!(
            text_summary(&result(RunStatus::Succeeded, Duration::from_millis(12_346))),
            "Execution time of the container: 12.35 s"
        );
        assert_eq!(
            text_summary(&result(RunStatus::TimedOut, Duration::from_secs(200))),
            "Timeout of 200 s reached. Aborting..."
        );
    }

    #[test]
    fn test_result_json() {
        let value = result_json(&result(RunStatus::TimedOut, Duration::from_secs(200)));
        assert_eq!(value["status"], "timed_out");
        assert_eq!(value["exit_code"], 1);
        assert_eq!(value["elapsed_secs"], 200.0);
        assert!(value.get("error").is_none());

        let mut failed = result(RunStatus::Failed { code: Some(3) }, Duration::from_secs(1));
        failed.error = Some("Traceback".into());
        let value = result_json(&failed);
        assert_eq!(value["status"], "failed");
        assert_eq!(value["container_exit_code"], 3);
        assert_eq!(value["error"], "Traceback");
    }

    #[test]
    fn test_error_json() {
        let err = RunnerError::SubmissionFailure {
            code: Some(3),
            elapsed: Duration::from_secs(2),
            stderr: String::new(),
        };
        let value = error_json(Some("FeTS_001"), &err);
        assert_eq!(value["error_kind"], "submission_failure");
        assert_eq!(value["container_exit_code"], 3);
        assert_eq!(value["exit_code"], 4);

        let err = RunnerError::config("missing --t1");
        let value = error_json(None, &err);
        assert!(value["subject_id"].is_null());
        assert_eq!(value["exit_code"], 2);
    }
}
