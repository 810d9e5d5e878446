//! Release artifact checks.
//!
//! Bundles from several platform jobs are merged into one directory before
//! upload; two files with the same name would silently overwrite each other
//! on the release, so the merge is rejected instead.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{BuildError, BuildResult};

/// Fail if any two files under `root` share a file name.
///
/// Returns the number of files checked.
pub fn check_unique_artifact_names(root: &Path) -> BuildResult<usize> {
    if !root.exists() {
        return Err(BuildError::ArtifactsDirMissing(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(BuildError::ArtifactsNotDirectory(root.to_path_buf()));
    }

    let mut by_name: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    let mut files = Vec::new();
    collect_files(root, &mut files)?;
    let total = files.len();
    for path in files {
        if let Some(name) = path.file_name() {
            by_name
                .entry(name.to_string_lossy().into_owned())
                .or_default()
                .push(path);
        }
    }

    let duplicates: BTreeMap<String, Vec<PathBuf>> = by_name
        .into_iter()
        .filter(|(_, paths)| paths.len() > 1)
        .map(|(name, mut paths)| {
            paths.sort();
            (name, paths)
        })
        .collect();
    if !duplicates.is_empty() {
        return Err(BuildError::DuplicateArtifacts { duplicates });
    }

    info!(event = "artifacts.checked", root = %root.display(), files = total);
    Ok(total)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> BuildResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_unique_names_pass() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("macos")).unwrap();
        std::fs::create_dir_all(dir.path().join("windows")).unwrap();
        std::fs::write(dir.path().join("macos/App_1.0_aarch64.dmg"), b"x").unwrap();
        std::fs::write(dir.path().join("windows/App_1.0_x64-setup.exe"), b"x").unwrap();

        assert_eq!(check_unique_artifact_names(dir.path()).unwrap(), 2);
    }

    #[test]
    fn test_duplicate_names_detected_across_directories() {
        let dir = tempdir().unwrap();
        for job in ["job-a", "job-b/nested"] {
            std::fs::create_dir_all(dir.path().join(job)).unwrap();
            std::fs::write(dir.path().join(job).join("latest.json"), b"{}").unwrap();
        }
        std::fs::write(dir.path().join("unique.zip"), b"x").unwrap();

        match check_unique_artifact_names(dir.path()).unwrap_err() {
            BuildError::DuplicateArtifacts { duplicates } => {
                assert_eq!(duplicates.len(), 1);
                assert_eq!(duplicates["latest.json"].len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_and_non_directory() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            check_unique_artifact_names(&dir.path().join("nope")),
            Err(BuildError::ArtifactsDirMissing(_))
        ));

        let file = dir.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            check_unique_artifact_names(&file),
            Err(BuildError::ArtifactsNotDirectory(_))
        ));
    }
}
