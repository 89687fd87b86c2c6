//! Command-line arguments.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use fets_runner::{GpuMode, OutputFormat, RuntimeKind};

/// Single-dash long flags used by the FeTS platform when calling the runner.
const LEGACY_FLAGS: &[(&str, &str)] = &[
    ("-t1", "--t1"),
    ("-t1c", "--t1c"),
    ("-t2", "--t2"),
    ("-fl", "--fl"),
];

/// Run a FeTS submission container against one test case.
#[derive(Debug, Parser)]
#[command(name = "fets-run-case", version, about, long_about = None)]
pub struct Cli {
    /// Container image to test. Should have the format 'teamXYZ.sif'
    pub sif_file: PathBuf,

    /// Subject ID of the case
    #[arg(short = 's', long = "subject-id", alias = "subject_id")]
    pub subject_id: String,

    /// Absolute path to the T1 image
    #[arg(long = "t1", alias = "t1_path", value_name = "PATH")]
    pub t1: PathBuf,

    /// Absolute path to the T1 post contrast image
    #[arg(long = "t1c", alias = "t1c_path", value_name = "PATH")]
    pub t1c: PathBuf,

    /// Absolute path to the T2 image
    #[arg(long = "t2", alias = "t2_path", value_name = "PATH")]
    pub t2: PathBuf,

    /// Absolute path to the FLAIR image
    #[arg(long = "fl", visible_alias = "flair", alias = "fl_path", value_name = "PATH")]
    pub fl: PathBuf,

    /// Output directory the container writes all results to
    #[arg(short = 'o', long = "out-folder", alias = "out_folder", value_name = "DIR")]
    pub out_folder: PathBuf,

    /// Time budget per case in seconds [default: 200]
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Container runtime flavor
    #[arg(long, value_enum)]
    pub runtime: Option<RuntimeArg>,

    /// Explicit path to the container runtime executable
    #[arg(long, value_name = "PATH")]
    pub runtime_path: Option<PathBuf>,

    /// GPU passthrough
    #[arg(long, value_enum)]
    pub gpu: Option<GpuArg>,

    /// Configuration file (TOML)
    #[arg(long, env = "FETS_RUNNER_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format for progress and the final report
    #[arg(long, value_enum, default_value_t = FormatArg::Text)]
    pub output_format: FormatArg,

    /// Log level
    #[arg(long, value_enum, env = "FETS_RUNNER_LOG_LEVEL", default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RuntimeArg {
    Singularity,
    Apptainer,
}

impl From<RuntimeArg> for RuntimeKind {
    fn from(arg: RuntimeArg) -> Self {
        match arg {
            RuntimeArg::Singularity => RuntimeKind::Singularity,
            RuntimeArg::Apptainer => RuntimeKind::Apptainer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GpuArg {
    Auto,
    On,
    Off,
}

impl From<GpuArg> for GpuMode {
    fn from(arg: GpuArg) -> Self {
        match arg {
            GpuArg::Auto => GpuMode::Auto,
            GpuArg::On => GpuMode::On,
            GpuArg::Off => GpuMode::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

/// Log level for CLI output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Only show errors
    Error,
    /// Show warnings and errors (default)
    #[default]
    Warn,
    /// Show informational messages, warnings, and errors
    Info,
    /// Show debug messages and above
    Debug,
    /// Show all messages including trace-level details
    Trace,
}

impl LogLevel {
    /// Convert to tracing filter string.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Rewrite the platform's single-dash modality flags (`-t1 PATH`) into the
/// long form clap understands. Values are never touched.
pub fn normalize_legacy_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut out = Vec::new();
    let mut after_separator = false;
    for arg in args {
        if after_separator {
            out.push(arg);
            continue;
        }
        if arg == "--" {
            after_separator = true;
            out.push(arg);
            continue;
        }
        let replacement = arg
            .to_str()
            .and_then(|s| LEGACY_FLAGS.iter().find(|(legacy, _)| *legacy == s))
            .map(|(_, long)| OsString::from(*long));
        out.push(replacement.unwrap_or(arg));
    }
    out
}
