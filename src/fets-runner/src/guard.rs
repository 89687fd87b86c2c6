//! Ground-truth exposure guard.
//!
//! The submission container is untrusted. Every host path that is bound into
//! it is checked against the segmentation file name patterns before the
//! container runtime is started:
//!
//! - every component of the path as given
//! - the file name after resolving symlinks
//! - for read-write (directory) binds, every entry already below the directory

use std::path::{Component, Path};

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, RunnerError};
use crate::mounts::{BindAccess, BindSpec};

/// Name patterns of BraTS/FeTS label files.
///
/// The first matches `<case>_seg.nii.gz` and its spelling variants; the
/// second matches `_seg.nii` anywhere in a name, so backups such as
/// `<case>_seg.nii.gz.bak` and directories named after a label file are
/// refused as well.
pub const DEFAULT_SEGMENTATION_PATTERNS: &[&str] = &[
    r"(^|[_\-.])seg(mentation)?\.nii(\.gz)?$",
    r"_seg\.nii",
];

/// Rejects bind sources that look like segmentation files.
#[derive(Debug, Clone)]
pub struct SegmentationGuard {
    patterns: Vec<Regex>,
}

impl Default for SegmentationGuard {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_SEGMENTATION_PATTERNS
                .iter()
                .map(|p| compile(p).expect("default patterns are valid"))
                .collect(),
        }
    }
}

fn compile(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

impl SegmentationGuard {
    /// Guard with the default patterns plus `extra` patterns (regex syntax,
    /// matched case-insensitively against single path components).
    pub fn with_extra_patterns<I, S>(extra: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut guard = Self::default();
        for pattern in extra {
            let pattern = pattern.as_ref();
            let regex = compile(pattern).map_err(|e| {
                RunnerError::config(format!("invalid segmentation pattern {pattern:?}: {e}"))
            })?;
            guard.patterns.push(regex);
        }
        Ok(guard)
    }

    /// Whether a single file or directory name matches any pattern.
    pub fn is_segmentation_name(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(name))
    }

    /// Check one host path (and its symlink target).
    pub fn check_path(&self, path: &Path) -> Result<()> {
        for component in path.components() {
            if let Component::Normal(name) = component
                && self.is_segmentation_name(&name.to_string_lossy())
            {
                return Err(violation(path));
            }
        }

        // A benign-looking link may point at a label file.
        if let Ok(resolved) = path.canonicalize()
            && resolved != path
            && let Some(name) = resolved.file_name()
            && self.is_segmentation_name(&name.to_string_lossy())
        {
            warn!(
                path = %path.display(),
                target = %resolved.display(),
                "Symlink resolves to a segmentation file"
            );
            return Err(violation(path));
        }

        Ok(())
    }

    /// Check every entry already present below a directory.
    ///
    /// A directory that does not exist yet is trivially clean.
    pub fn check_tree(&self, root: &Path) -> Result<()> {
        if !root.exists() {
            return Ok(());
        }

        for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
            let entry = entry.map_err(|e| {
                RunnerError::Io(
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
                )
            })?;
            if self.is_segmentation_name(&entry.file_name().to_string_lossy()) {
                return Err(violation(entry.path()));
            }
        }
        Ok(())
    }

    /// Check every source of a bind specification.
    pub fn check_binds(&self, binds: &BindSpec) -> Result<()> {
        for bind in binds.iter() {
            self.check_path(&bind.source)?;
            if bind.access == BindAccess::ReadWrite {
                self.check_tree(&bind.source)?;
            }
        }
        debug!(binds = binds.len(), "Segmentation guard passed");
        Ok(())
    }
}

fn violation(path: &Path) -> RunnerError {
    RunnerError::SafetyViolation {
        path: path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_default_pattern_matches_label_names() {
        let guard = SegmentationGuard::default();
        for name in [
            "FeTS_001_seg.nii.gz",
            "FeTS_001_SEG.NII.GZ",
            "case-seg.nii",
            "case_segmentation.nii.gz",
            "seg.nii.gz",
            "FeTS_001_seg.nii.gz.bak",
            "FeTS_001_seg.nii.gz~",
            "a_seg.nii.gz_dir",
        ] {
            assert!(guard.is_segmentation_name(name), "{name}");
        }
    }

    #[test]
    fn test_check_path_rejects_label_substring() {
        let guard = SegmentationGuard::default();
        for path in [
            "/x/FeTS_001_seg.nii.gz.bak",
            "/x/FeTS_001_seg.nii.gz~",
            "/gt/a_seg.nii.gz_dir/a_t1.nii.gz",
        ] {
            assert!(
                matches!(
                    guard.check_path(Path::new(path)),
                    Err(RunnerError::SafetyViolation { .. })
                ),
                "{path}"
            );
        }
    }

    #[test]
    fn test_default_pattern_ignores_modalities() {
        let guard = SegmentationGuard::default();
        for name in [
            "FeTS_001_t1.nii.gz",
            "FeTS_001_t1ce.nii.gz",
            "FeTS_001_flair.nii.gz",
            "segments_t2.nii.gz",
            "out_dir",
        ] {
            assert!(!guard.is_segmentation_name(name), "{name}");
        }
    }

    #[test]
    fn test_check_path_rejects_any_component() {
        let guard = SegmentationGuard::default();
        let path = PathBuf::from("/x/a_seg.nii.gz/a_t1.nii.gz");
        assert!(matches!(
            guard.check_path(&path),
            Err(RunnerError::SafetyViolation { .. })
        ));
        assert!(guard.check_path(Path::new("/x/a_t1.nii.gz")).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_check_path_rejects_symlink_to_label() {
        let dir = TempDir::new().unwrap();
        let label = dir.path().join("a_seg.nii.gz");
        std::fs::write(&label, b"labels").unwrap();
        let link = dir.path().join("a_t1.nii.gz");
        std::os::unix::fs::symlink(&label, &link).unwrap();

        let guard = SegmentationGuard::default();
        assert!(matches!(
            guard.check_path(&link),
            Err(RunnerError::SafetyViolation { path }) if path == link
        ));
    }

    #[test]
    fn test_check_tree_finds_nested_label() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("previous");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("FeTS_002_seg.nii.gz"), b"labels").unwrap();

        let guard = SegmentationGuard::default();
        assert!(guard.check_tree(dir.path()).is_err());
        assert!(guard.check_tree(&dir.path().join("absent")).is_ok());
    }

    #[test]
    fn test_extra_patterns() {
        let guard = SegmentationGuard::with_extra_patterns([r"_label\.nii\.gz$"]).unwrap();
        assert!(guard.is_segmentation_name("case_label.nii.gz"));
        assert!(guard.is_segmentation_name("case_seg.nii.gz"));

        let err = SegmentationGuard::with_extra_patterns(["("]).unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }
}
