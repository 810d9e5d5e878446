//! Runtime source validation
//!
//! Before anything is copied, the externally supplied runtime directory is
//! checked against the project root and the build output directory so the
//! copy step can neither recurse into its own output nor embed the whole
//! source tree.

use crate::error::RuntimeError;
use crate::Result;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Environment key naming the runtime source directory.
pub const RUNTIME_SOURCE_KEY: &str = "DESKPACK_RUNTIME_SOURCE";

/// Marker file written by `venv`/`virtualenv` at the environment root.
pub const VENV_MARKER: &str = "pyvenv.cfg";

/// A runtime directory that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSource {
    /// Input as supplied by the operator
    pub raw: String,
    /// Canonical absolute path
    pub path: PathBuf,
}

/// Validate a claimed runtime directory and return its canonical path.
///
/// Relative inputs and a relative `output_dir` are taken from `project_root`.
/// Read-only: nothing on disk is created or changed.
pub fn validate_runtime_source(
    project_root: &Path,
    output_dir: &Path,
    input: Option<&str>,
) -> Result<RuntimeSource> {
    let raw = input
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(RuntimeError::MissingInput {
            key: RUNTIME_SOURCE_KEY,
        })?;

    let candidate = PathBuf::from(raw);
    let candidate = if candidate.is_absolute() {
        candidate
    } else {
        project_root.join(candidate)
    };
    if !candidate.exists() {
        return Err(RuntimeError::NotFound { path: candidate });
    }
    let path = candidate.canonicalize()?;

    let output_dir = if output_dir.is_absolute() {
        output_dir.to_path_buf()
    } else {
        project_root.join(output_dir)
    };

    let runtime_key = comparison_key(&path);
    let output_key = comparison_key(&output_dir);
    let root_key = comparison_key(project_root);
    debug!(
        runtime = %runtime_key,
        output = %output_key,
        root = %root_key,
        "Comparing runtime source"
    );

    if is_same_or_nested(&root_key, &runtime_key) {
        return Err(RuntimeError::TooBroadSource {
            runtime: path,
            project_root: project_root.to_path_buf(),
        });
    }

    if is_same_or_nested(&runtime_key, &output_key) || is_same_or_nested(&output_key, &runtime_key)
    {
        return Err(RuntimeError::UnsafeOverlap {
            runtime: path,
            output: output_dir,
        });
    }

    if path.join(VENV_MARKER).exists() {
        return Err(RuntimeError::VirtualEnvironmentDetected {
            runtime: path,
            marker: VENV_MARKER,
        });
    }

    info!(runtime = %path.display(), "Runtime source validated");
    Ok(RuntimeSource {
        raw: raw.to_string(),
        path,
    })
}

/// Normalized string form used for overlap comparisons.
///
/// Existing paths are canonicalized; missing ones (an output directory that
/// has not been created yet) are absolutized lexically. Separators become
/// `/`, trailing separators are dropped, and case is folded where the
/// filesystem is case-insensitive.
pub fn comparison_key(path: &Path) -> String {
    let resolved = path
        .canonicalize()
        .unwrap_or_else(|_| lexical_absolute(path));
    let mut key = resolved.to_string_lossy().replace('\\', "/");
    if let Some(stripped) = key.strip_prefix("//?/") {
        key = stripped.to_string();
    }
    while key.len() > 1 && key.ends_with('/') {
        key.pop();
    }
    if case_insensitive_fs() {
        key = key.to_lowercase();
    }
    key
}

/// `true` when `child` equals `parent` or lies beneath it, component-wise.
pub fn is_same_or_nested(child: &str, parent: &str) -> bool {
    if child == parent {
        return true;
    }
    if parent.ends_with('/') {
        child.starts_with(parent)
    } else {
        child
            .strip_prefix(parent)
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

fn case_insensitive_fs() -> bool {
    cfg!(any(windows, target_os = "macos"))
}

fn lexical_absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
