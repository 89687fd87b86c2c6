//! FeTS case runner CLI.
//!
//! - `args` - Command-line argument parsing
//! - `logging` - tracing subscriber setup
//! - [`run`] - resolve configuration, run one case, map the outcome to an
//!   exit code

pub mod args;
pub mod logging;

use anyhow::{Context, Result};
use fets_runner::config::timeout_from_secs;
use fets_runner::error::EXIT_CONFIGURATION;
use fets_runner::{
    CaseInput, CaseRunner, ChildOutput, ConfigFile, ContainerSpec, OutputFormat, OutputLocation,
    Reporter, RunConfig, RunnerError, SingularityRuntime, TokioExecutor,
};
use tracing::debug;

pub use args::{Cli, LogLevel, normalize_legacy_args};

/// Merge defaults, the config file and command-line flags.
pub fn build_run_config(cli: &Cli) -> Result<RunConfig> {
    let mut config = match ConfigFile::locate(cli.config.as_deref()) {
        Some(path) => {
            let file = ConfigFile::load(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            RunConfig::from_file(&file)?
        }
        None => RunConfig::default(),
    };

    if let Some(secs) = cli.timeout {
        config.timeout = timeout_from_secs(secs).context("Invalid --timeout")?;
    }
    if let Some(runtime) = cli.runtime {
        config.runtime = runtime.into();
    }
    if let Some(path) = &cli.runtime_path {
        config.runtime_path = Some(path.clone());
    }
    if let Some(gpu) = cli.gpu {
        config.gpu = gpu.into();
    }

    debug!(?config, "Resolved run configuration");
    Ok(config)
}

/// Run one case and return the process exit code.
pub async fn run(cli: Cli) -> i32 {
    let format: OutputFormat = cli.output_format.into();
    let reporter = Reporter::new(format);

    let config = match build_run_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            let err = RunnerError::config(format!("{e:#}"));
            reporter.write_error(Some(&cli.subject_id), &err);
            return EXIT_CONFIGURATION;
        }
    };

    // Keep stdout clean for the JSON report.
    let child_stdout = match format {
        OutputFormat::Text => ChildOutput::Inherit,
        OutputFormat::Json => ChildOutput::Stderr,
    };
    let runtime = SingularityRuntime::new(config.runtime, config.runtime_path.clone());
    let executor = TokioExecutor::new().with_stdout(child_stdout);

    let runner = match CaseRunner::new(ContainerSpec::new(&cli.sif_file), config, runtime, executor) {
        Ok(runner) => runner,
        Err(err) => {
            reporter.write_error(Some(&cli.subject_id), &err);
            return err.exit_code();
        }
    };

    let case = CaseInput::new(
        cli.subject_id.clone(),
        cli.t1.clone(),
        cli.t1c.clone(),
        cli.t2.clone(),
        cli.fl.clone(),
    );
    let output = OutputLocation::new(&cli.out_folder);

    if format == OutputFormat::Text {
        println!("Testing FeTS singularity image...");
    }

    let prepared = match runner.prepare(&case, &output) {
        Ok(prepared) => prepared,
        Err(err) => {
            reporter.write_error(Some(&case.subject_id), &err);
            return err.exit_code();
        }
    };
    reporter.write_prepared(&prepared);

    let result = match runner.execute(&prepared).await {
        Ok(result) => result,
        Err(err) => {
            reporter.write_error(Some(&case.subject_id), &err);
            return err.exit_code();
        }
    };

    // The JSON report of a failed run carries the status and stderr itself.
    if format == OutputFormat::Json {
        reporter.write_result(&result);
        return result.exit_code();
    }

    let exit_code = result.exit_code();
    match result.into_checked() {
        Ok(result) => {
            reporter.write_result(&result);
            exit_code
        }
        Err(err) => {
            reporter.write_error(Some(&case.subject_id), &err);
            err.exit_code()
        }
    }
}
