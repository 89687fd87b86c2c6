//! Case inputs: one subject and its four MRI modalities.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RunnerError};

/// MRI modality of a case image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Native T1.
    T1,
    /// T1 post contrast.
    T1c,
    /// T2.
    T2,
    /// T2 fluid attenuated inversion recovery.
    Flair,
}

impl Modality {
    /// All modalities in the order they are passed to the container.
    pub const ALL: [Modality; 4] = [Modality::T1, Modality::T1c, Modality::T2, Modality::Flair];

    /// Field name used in error messages and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::T1 => "t1",
            Modality::T1c => "t1c",
            Modality::T2 => "t2",
            Modality::Flair => "flair",
        }
    }

    /// Flag the submission container expects for this modality.
    pub fn container_flag(&self) -> &'static str {
        match self {
            Modality::T1 => "-t1",
            Modality::T1c => "-t1c",
            Modality::T2 => "-t2",
            Modality::Flair => "-fl",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One test case handed to the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseInput {
    pub subject_id: String,
    pub t1: PathBuf,
    pub t1c: PathBuf,
    pub t2: PathBuf,
    pub flair: PathBuf,
}

impl CaseInput {
    pub fn new(
        subject_id: impl Into<String>,
        t1: impl Into<PathBuf>,
        t1c: impl Into<PathBuf>,
        t2: impl Into<PathBuf>,
        flair: impl Into<PathBuf>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            t1: t1.into(),
            t1c: t1c.into(),
            t2: t2.into(),
            flair: flair.into(),
        }
    }

    /// Path of the image for `modality`.
    pub fn path(&self, modality: Modality) -> &Path {
        match modality {
            Modality::T1 => &self.t1,
            Modality::T1c => &self.t1c,
            Modality::T2 => &self.t2,
            Modality::Flair => &self.flair,
        }
    }

    /// Iterate over `(modality, path)` pairs in container argument order.
    pub fn images(&self) -> impl Iterator<Item = (Modality, &Path)> {
        Modality::ALL.into_iter().map(move |m| (m, self.path(m)))
    }

    /// Check that every field is present and every image is an existing
    /// regular file.
    ///
    /// Does not look at file names; see [`crate::guard`] for that.
    pub fn validate(&self) -> Result<()> {
        if self.subject_id.trim().is_empty() {
            return Err(RunnerError::config("subject identifier must not be empty"));
        }
        if self.subject_id.chars().any(char::is_whitespace) {
            return Err(RunnerError::config(format!(
                "subject identifier must not contain whitespace: {:?}",
                self.subject_id
            )));
        }
        // Passed as a bare argument after `-s`.
        if self.subject_id.starts_with('-') {
            return Err(RunnerError::config(format!(
                "subject identifier must not start with '-': {:?}",
                self.subject_id
            )));
        }

        for (modality, path) in self.images() {
            if path.as_os_str().is_empty() {
                return Err(RunnerError::config(format!(
                    "path for {modality} image must not be empty"
                )));
            }
            let metadata = std::fs::metadata(path).map_err(|_| RunnerError::InputNotFound {
                field: modality.as_str(),
                path: path.to_path_buf(),
            })?;
            if !metadata.is_file() {
                return Err(RunnerError::NotAFile {
                    field: modality.as_str(),
                    path: path.to_path_buf(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn case_in(dir: &TempDir) -> CaseInput {
        let mut paths = Vec::new();
        for name in ["a_t1.nii.gz", "a_t1c.nii.gz", "a_t2.nii.gz", "a_flair.nii.gz"] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"nifti").unwrap();
            paths.push(path);
        }
        CaseInput::new(
            "FeTS_001",
            paths[0].clone(),
            paths[1].clone(),
            paths[2].clone(),
            paths[3].clone(),
        )
    }

    #[test]
    fn test_valid_case() {
        let dir = TempDir::new().unwrap();
        assert!(case_in(&dir).validate().is_ok());
    }

    #[test]
    fn test_empty_subject_rejected() {
        let dir = TempDir::new().unwrap();
        let mut case = case_in(&dir);
        case.subject_id = "  ".into();
        let err = case.validate().unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }

    #[test]
    fn test_flag_like_subject_rejected() {
        let dir = TempDir::new().unwrap();
        let mut case = case_in(&dir);
        case.subject_id = "--nv".into();
        let err = case.validate().unwrap_err();
        assert_eq!(err.kind(), "configuration_error");

        case.subject_id = "FeTS-001".into();
        assert!(case.validate().is_ok());
    }

    #[test]
    fn test_empty_path_rejected() {
        let dir = TempDir::new().unwrap();
        let mut case = case_in(&dir);
        case.t2 = PathBuf::new();
        let err = case.validate().unwrap_err();
        assert!(err.to_string().contains("t2"));
    }

    #[test]
    fn test_missing_file_rejected() {
        let dir = TempDir::new().unwrap();
        let mut case = case_in(&dir);
        case.flair = dir.path().join("missing.nii.gz");
        assert!(matches!(
            case.validate(),
            Err(RunnerError::InputNotFound { field: "flair", .. })
        ));
    }

    #[test]
    fn test_directory_rejected() {
        let dir = TempDir::new().unwrap();
        let mut case = case_in(&dir);
        case.t1c = dir.path().to_path_buf();
        assert!(matches!(
            case.validate(),
            Err(RunnerError::NotAFile { field: "t1c", .. })
        ));
    }

    #[test]
    fn test_images_in_container_order() {
        let case = CaseInput::new("s", "/a", "/b", "/c", "/d");
        let flags: Vec<_> = case.images().map(|(m, _)| m.container_flag()).collect();
        assert_eq!(flags, ["-t1", "-t1c", "-t2", "-fl"]);
    }
}
