//! # Annotations Discovery
//!
//! Finds the annotations file of a kernel source tree when none is given.
//!
//! Candidates, first existing wins:
//! 1. `$DEBIAN/config/annotations`
//! 2. `<DEBIAN from debian/debian.env>/config/annotations`
//! 3. `debian.master/config/annotations`

use crate::AnnotationError;
use crate::primitives::{ANNOTATIONS_RELATIVE_PATH, DEBIAN_ENV_FILE, DEFAULT_DEBIAN_DIR};
use std::path::{Path, PathBuf};

/// Resolve the annotations file to operate on.
///
/// An explicit path is returned untouched, even if it does not exist; the
/// load that follows reports that as an I/O error. Without one, the
/// candidates above are tried relative to `root`.
pub fn locate_annotations(
    explicit: Option<&Path>,
    debian_env: Option<&str>,
    root: &Path,
) -> Result<PathBuf, AnnotationError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let mut candidates = Vec::new();
    if let Some(debian) = debian_env.filter(|d| !d.is_empty()) {
        candidates.push(root.join(debian).join(ANNOTATIONS_RELATIVE_PATH));
    }
    if let Some(debian) = debian_from_env_file(&root.join(DEBIAN_ENV_FILE)) {
        candidates.push(root.join(debian).join(ANNOTATIONS_RELATIVE_PATH));
    }
    candidates.push(root.join(DEFAULT_DEBIAN_DIR).join(ANNOTATIONS_RELATIVE_PATH));

    candidates
        .into_iter()
        .find(|candidate| candidate.is_file())
        .ok_or(AnnotationError::AutodetectFailed)
}

/// The `DEBIAN=` value of a `debian.env` file, if it has one.
fn debian_from_env_file(path: &Path) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("DEBIAN="))
        .map(|value| value.trim().trim_matches('"').to_string())
        .find(|value| !value.is_empty())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) -> PathBuf {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(&path, "{}").expect("write");
        path
    }

    #[test]
    fn explicit_path_wins() {
        let dir = TempDir::new().expect("tempdir");
        let explicit = dir.path().join("whatever");
        let found = locate_annotations(Some(&explicit), Some("debian.x"), dir.path())
            .expect("explicit");
        assert_eq!(found, explicit);
    }

    #[test]
    fn environment_variable_is_tried_first() {
        let dir = TempDir::new().expect("tempdir");
        let expected = touch(dir.path(), "debian.hwe/config/annotations");
        touch(dir.path(), "debian.master/config/annotations");

        let found = locate_annotations(None, Some("debian.hwe"), dir.path()).expect("found");
        assert_eq!(found, expected);
    }

    #[test]
    fn debian_env_file_is_consulted() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("debian")).expect("mkdir");
        std::fs::write(dir.path().join("debian/debian.env"), "DEBIAN=debian.oem\n")
            .expect("write");
        let expected = touch(dir.path(), "debian.oem/config/annotations");

        let found = locate_annotations(None, None, dir.path()).expect("found");
        assert_eq!(found, expected);
    }

    #[test]
    fn falls_back_to_master() {
        let dir = TempDir::new().expect("tempdir");
        let expected = touch(dir.path(), "debian.master/config/annotations");

        let found = locate_annotations(None, Some("debian.missing"), dir.path()).expect("found");
        assert_eq!(found, expected);
    }

    #[test]
    fn nothing_found_is_autodetect_failure() {
        let dir = TempDir::new().expect("tempdir");
        let err = locate_annotations(None, None, dir.path()).expect_err("none");
        assert!(matches!(err, AnnotationError::AutodetectFailed));
    }
}
