//! Bind-mount specification for one case.
//!
//! Each input image is exposed read-only under the container input root using
//! its host base name; the output directory is exposed read-write at the
//! container output root. Nothing else is bound.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::case::CaseInput;
use crate::error::{Result, RunnerError};

/// Default container directory the case images appear in.
pub const CONTAINER_INPUT_ROOT: &str = "/data";

/// Default container directory the submission writes its results to.
pub const CONTAINER_OUTPUT_ROOT: &str = "/out_dir";

/// Characters with meaning inside a bind path string.
const BIND_SEPARATORS: &[char] = &[',', ':'];

/// Container image and its fixed mount points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Path of the image artifact (e.g. `teamXYZ.sif`).
    pub image: PathBuf,
    /// Container directory holding the case images.
    pub input_root: PathBuf,
    /// Container directory receiving the results.
    pub output_root: PathBuf,
}

impl ContainerSpec {
    /// Spec for `image` with the standard `/data` and `/out_dir` mount points.
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            input_root: PathBuf::from(CONTAINER_INPUT_ROOT),
            output_root: PathBuf::from(CONTAINER_OUTPUT_ROOT),
        }
    }

    /// Container path an input file is visible at.
    pub fn container_input_path(&self, host: &Path) -> Result<PathBuf> {
        let name = host.file_name().ok_or_else(|| {
            RunnerError::config(format!("input path has no file name: {}", host.display()))
        })?;
        Ok(self.input_root.join(name))
    }

    /// Check that the image artifact exists.
    pub fn validate(&self) -> Result<()> {
        if self.image.as_os_str().is_empty() {
            return Err(RunnerError::config("container image path must not be empty"));
        }
        if !self.image.is_file() {
            return Err(RunnerError::config(format!(
                "container image not found: {}",
                self.image.display()
            )));
        }
        Ok(())
    }
}

/// Directory the container writes its results to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLocation {
    pub path: PathBuf,
}

impl OutputLocation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create the directory if needed and verify the current process can
    /// write to it.
    pub fn prepare(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(RunnerError::config("output directory must not be empty"));
        }
        if self.path.exists() && !self.path.is_dir() {
            return Err(RunnerError::OutputNotWritable {
                path: self.path.clone(),
                message: "exists and is not a directory".into(),
            });
        }

        std::fs::create_dir_all(&self.path).map_err(|e| RunnerError::OutputNotWritable {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        let probe = self.path.join(".fets_write_test");
        match std::fs::File::create(&probe) {
            Ok(_) => {
                if let Err(e) = std::fs::remove_file(&probe) {
                    debug!("Failed to remove write test file {}: {e}", probe.display());
                }
                Ok(())
            }
            Err(e) => Err(RunnerError::OutputNotWritable {
                path: self.path.clone(),
                message: e.to_string(),
            }),
        }
    }
}

/// Access mode of a bind mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindAccess {
    ReadOnly,
    ReadWrite,
}

impl BindAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindAccess::ReadOnly => "ro",
            BindAccess::ReadWrite => "rw",
        }
    }
}

/// One host path exposed inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    pub source: PathBuf,
    pub target: PathBuf,
    pub access: BindAccess,
}

impl fmt::Display for BindMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.source.display(),
            self.target.display(),
            self.access.as_str()
        )
    }
}

/// The complete set of bind mounts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindSpec {
    mounts: Vec<BindMount>,
}

impl BindSpec {
    /// Build the binds for a case: four read-only images, one read-write
    /// output directory.
    pub fn for_case(
        case: &CaseInput,
        output: &OutputLocation,
        container: &ContainerSpec,
    ) -> Result<Self> {
        let mut spec = Self::default();
        let mut seen = HashSet::new();

        for (modality, host) in case.images() {
            let target = container.container_input_path(host)?;
            if !seen.insert(target.clone()) {
                return Err(RunnerError::config(format!(
                    "{modality} image {} collides with another input at {}",
                    host.display(),
                    target.display()
                )));
            }
            spec.push(BindMount {
                source: std::path::absolute(host)?,
                target,
                access: BindAccess::ReadOnly,
            })?;
        }

        spec.push(BindMount {
            source: std::path::absolute(&output.path)?,
            target: container.output_root.clone(),
            access: BindAccess::ReadWrite,
        })?;

        debug!(mounts = spec.len(), "Built bind specification");
        Ok(spec)
    }

    /// Append a mount, rejecting paths that cannot be expressed in a bind
    /// path string.
    pub fn push(&mut self, mount: BindMount) -> Result<()> {
        for path in [&mount.source, &mount.target] {
            if path.to_string_lossy().contains(BIND_SEPARATORS) {
                return Err(RunnerError::config(format!(
                    "bind path must not contain ',' or ':': {}",
                    path.display()
                )));
            }
        }
        self.mounts.push(mount);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &BindMount> {
        self.mounts.iter()
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    /// Render as a `src:dst:mode,...` bind path value.
    pub fn to_bind_path(&self) -> String {
        self.mounts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_case() -> CaseInput {
        CaseInput::new(
            "a",
            "/x/a_t1.nii.gz",
            "/x/a_t1c.nii.gz",
            "/x/a_t2.nii.gz",
            "/x/a_flair.nii.gz",
        )
    }

    #[test]
    fn test_exactly_five_binds() {
        let spec = BindSpec::for_case(
            &sample_case(),
            &OutputLocation::new("/out"),
            &ContainerSpec::new("/images/team.sif"),
        )
        .unwrap();

        let mounts: Vec<_> = spec.iter().cloned().collect();
        let ro = |src: &str, dst: &str| BindMount {
            source: PathBuf::from(src),
            target: PathBuf::from(dst),
            access: BindAccess::ReadOnly,
        };
        assert_eq!(
            mounts,
            vec![
                ro("/x/a_t1.nii.gz", "/data/a_t1.nii.gz"),
                ro("/x/a_t1c.nii.gz", "/data/a_t1c.nii.gz"),
                ro("/x/a_t2.nii.gz", "/data/a_t2.nii.gz"),
                ro("/x/a_flair.nii.gz", "/data/a_flair.nii.gz"),
                BindMount {
                    source: PathBuf::from("/out"),
                    target: PathBuf::from("/out_dir"),
                    access: BindAccess::ReadWrite,
                },
            ]
        );
    }

    #[test]
    fn test_bind_path_rendering() {
        let spec = BindSpec::for_case(
            &sample_case(),
            &OutputLocation::new("/out"),
            &ContainerSpec::new("/images/team.sif"),
        )
        .unwrap();

        assert_eq!(
            spec.to_bind_path(),
            "/x/a_t1.nii.gz:/data/a_t1.nii.gz:ro,\
             /x/a_t1c.nii.gz:/data/a_t1c.nii.gz:ro,\
             /x/a_t2.nii.gz:/data/a_t2.nii.gz:ro,\
             /x/a_flair.nii.gz:/data/a_flair.nii.gz:ro,\
             /out:/out_dir:rw"
        );
    }

    #[test]
    fn test_colliding_basenames_rejected() {
        let mut case = sample_case();
        case.t2 = PathBuf::from("/y/a_t1.nii.gz");
        let err = BindSpec::for_case(
            &case,
            &OutputLocation::new("/out"),
            &ContainerSpec::new("team.sif"),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }

    #[test]
    fn test_separator_in_path_rejected() {
        let mut case = sample_case();
        case.flair = PathBuf::from("/x/a,b_flair.nii.gz");
        assert!(
            BindSpec::for_case(
                &case,
                &OutputLocation::new("/out"),
                &ContainerSpec::new("team.sif"),
            )
            .is_err()
        );

        assert!(
            BindSpec::for_case(
                &sample_case(),
                &OutputLocation::new("/out:/etc"),
                &ContainerSpec::new("team.sif"),
            )
            .is_err()
        );
    }

    #[test]
    fn test_output_location_created() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = OutputLocation::new(dir.path().join("nested").join("out"));
        out.prepare().unwrap();
        assert!(out.path.is_dir());
        assert!(!out.path.join(".fets_write_test").exists());
    }

    #[test]
    fn test_output_location_must_be_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"").unwrap();
        assert!(matches!(
            OutputLocation::new(&file).prepare(),
            Err(RunnerError::OutputNotWritable { .. })
        ));
    }
}
