//! Run configuration.
//!
//! Values come from three layers, highest precedence first:
//! 1. Command-line flags
//! 2. A TOML file (`--config` or `FETS_RUNNER_CONFIG`)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RunnerError};

/// Per-case time budget used when nothing else is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(200);

/// Environment variable for the configuration file path.
pub const FETS_RUNNER_CONFIG_ENV: &str = "FETS_RUNNER_CONFIG";

/// Container runtime flavor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    #[default]
    Singularity,
    Apptainer,
}

impl RuntimeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKind::Singularity => "singularity",
            RuntimeKind::Apptainer => "apptainer",
        }
    }
}

/// GPU passthrough policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuMode {
    /// Pass the GPU through when the host has an NVIDIA driver.
    #[default]
    Auto,
    /// Always request GPU passthrough.
    On,
    /// Never request GPU passthrough.
    Off,
}

/// Settings for one case run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Time budget for the container, per case.
    pub timeout: Duration,
    pub runtime: RuntimeKind,
    /// Explicit runtime executable; looked up on `PATH` when unset.
    pub runtime_path: Option<PathBuf>,
    pub gpu: GpuMode,
    /// Additional segmentation name patterns (regex).
    pub extra_segmentation_patterns: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            runtime: RuntimeKind::default(),
            runtime_path: None,
            gpu: GpuMode::default(),
            extra_segmentation_patterns: Vec::new(),
        }
    }
}

impl RunConfig {
    /// Defaults overlaid with the values present in `file`.
    pub fn from_file(file: &ConfigFile) -> Result<Self> {
        let mut config = Self::default();
        if let Some(secs) = file.timeout_secs {
            config.timeout = timeout_from_secs(secs)?;
        }
        if let Some(runtime) = file.runtime {
            config.runtime = runtime;
        }
        if let Some(path) = &file.runtime_path {
            config.runtime_path = Some(path.clone());
        }
        if let Some(gpu) = file.gpu {
            config.gpu = gpu;
        }
        config
            .extra_segmentation_patterns
            .extend(file.segmentation_patterns.iter().cloned());
        Ok(config)
    }
}

/// Convert a positive number of seconds into a timeout.
pub fn timeout_from_secs(secs: u64) -> Result<Duration> {
    if secs == 0 {
        return Err(RunnerError::config("timeout must be at least one second"));
    }
    Ok(Duration::from_secs(secs))
}

/// On-disk configuration (`config.toml`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub timeout_secs: Option<u64>,
    pub runtime: Option<RuntimeKind>,
    pub runtime_path: Option<PathBuf>,
    pub gpu: Option<GpuMode>,
    #[serde(default)]
    pub segmentation_patterns: Vec<String>,
}

impl ConfigFile {
    /// Parse a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RunnerError::config(format!("cannot read config {}: {e}", path.display()))
        })?;
        let file = Self::parse(&content)
            .map_err(|e| RunnerError::config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Loaded runner configuration");
        Ok(file)
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Locate the configuration file: the explicit path, then
    /// `FETS_RUNNER_CONFIG`. Returns `None` when neither is set.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        match std::env::var(FETS_RUNNER_CONFIG_ENV) {
            Ok(val) if !val.is_empty() => Some(PathBuf::from(val)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(200));
        assert_eq!(config.runtime, RuntimeKind::Singularity);
        assert_eq!(config.gpu, GpuMode::Auto);
        assert!(config.runtime_path.is_none());
    }

    #[test]
    fn test_parse_full_file() {
        let file = ConfigFile::parse(
            r#"
timeout_secs = 600
runtime = "apptainer"
runtime_path = "/opt/apptainer/bin/apptainer"
gpu = "off"
segmentation_patterns = ['_label\.nii\.gz$']
"#,
        )
        .unwrap();

        let config = RunConfig::from_file(&file).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(600));
        assert_eq!(config.runtime, RuntimeKind::Apptainer);
        assert_eq!(
            config.runtime_path,
            Some(PathBuf::from("/opt/apptainer/bin/apptainer"))
        );
        assert_eq!(config.gpu, GpuMode::Off);
        assert_eq!(config.extra_segmentation_patterns, vec![r"_label\.nii\.gz$"]);
    }

    #[test]
    fn test_empty_file_keeps_defaults() {
        let file = ConfigFile::parse("").unwrap();
        assert_eq!(RunConfig::from_file(&file).unwrap(), RunConfig::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(ConfigFile::parse("timeout = 5").is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let file = ConfigFile {
            timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(RunConfig::from_file(&file).is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "gpu = \"sometimes\"").unwrap();
        let err = ConfigFile::load(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_locate_prefers_explicit() {
        let explicit = PathBuf::from("/etc/fets/runner.toml");
        assert_eq!(ConfigFile::locate(Some(&explicit)), Some(explicit));
    }
}
