//! Logging setup.
//!
//! Logs go to stderr; stdout carries the progress lines and reports.

use tracing_subscriber::EnvFilter;

use crate::args::LogLevel;

/// Build the filter: `RUST_LOG` wins when set, otherwise the runner crates log
/// at `level` and everything else at `warn`.
pub fn build_filter(level: LogLevel) -> EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(format!(
            "warn,fets_runner={0},fets_runner_cli={0}",
            level.as_filter_str()
        )),
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(level: LogLevel, verbose: bool) {
    let level = if verbose { LogLevel::Debug } else { level };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
