//! Error types for deskpack-runtime

use std::path::PathBuf;
use thiserror::Error;

use crate::version::{Provenance, PythonVersion};

/// Errors that can occur while validating or probing a packaged runtime
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No runtime source was supplied
    #[error("No runtime source supplied; set {key} to a standalone Python distribution")]
    MissingInput { key: &'static str },

    /// Runtime source does not exist
    #[error("Runtime source not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Runtime source and output directory overlap
    #[error(
        "Runtime source {} overlaps the build output directory {}",
        runtime.display(),
        output.display()
    )]
    UnsafeOverlap { runtime: PathBuf, output: PathBuf },

    /// Runtime source is the project root or one of its ancestors
    #[error(
        "Runtime source {} is too broad: it contains the project root {}",
        runtime.display(),
        project_root.display()
    )]
    TooBroadSource {
        runtime: PathBuf,
        project_root: PathBuf,
    },

    /// Runtime source is a virtual environment, not a standalone runtime
    #[error(
        "Runtime source {} is a virtual environment ({} found); use a standalone distribution",
        runtime.display(),
        marker
    )]
    VirtualEnvironmentDetected {
        runtime: PathBuf,
        marker: &'static str,
    },

    /// Explicit version override is not `major.minor`
    #[error("Invalid {key} value {value:?}: expected <major>.<minor>, e.g. 3.12")]
    InvalidVersionFormat { key: &'static str, value: String },

    /// No version expectation could be derived
    #[error("Cannot determine the expected Python version ({reason}); set {key} explicitly")]
    UnresolvedConstraint { key: &'static str, reason: String },

    /// The manifest helper ran and reported a structured error
    #[error("Failed to read requires-python from {} ({code}): {message}", path.display())]
    ManifestReadFailed {
        path: PathBuf,
        code: String,
        message: String,
    },

    /// The interpreter probe itself failed (spawn, exit status, timeout, output)
    #[error("Runtime {label} probe failed for {}: {reason}", interpreter.display())]
    ProbeFailed {
        interpreter: PathBuf,
        label: &'static str,
        reason: String,
    },

    /// Actual version is below the lower bound
    #[error("Packaged runtime is Python {actual}, but at least {expected} is required ({provenance})")]
    VersionTooLow {
        expected: PythonVersion,
        actual: PythonVersion,
        provenance: Provenance,
    },

    /// Actual version differs from the exact expectation
    #[error("Packaged runtime is Python {actual}, but exactly {expected} is required ({provenance})")]
    VersionMismatch {
        expected: PythonVersion,
        actual: PythonVersion,
        provenance: Provenance,
    },

    /// No interpreter executable at the conventional locations
    #[error("Cannot find a Python executable under {}", runtime.display())]
    InterpreterNotFound { runtime: PathBuf },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RuntimeError {
    /// Missing or malformed operator input, or an unsafe location.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RuntimeError::MissingInput { .. }
                | RuntimeError::NotFound { .. }
                | RuntimeError::UnsafeOverlap { .. }
                | RuntimeError::TooBroadSource { .. }
                | RuntimeError::VirtualEnvironmentDetected { .. }
                | RuntimeError::InvalidVersionFormat { .. }
                | RuntimeError::UnresolvedConstraint { .. }
                | RuntimeError::ManifestReadFailed { .. }
        )
    }

    /// The runtime works but does not satisfy the version expectation.
    pub fn is_compatibility(&self) -> bool {
        matches!(
            self,
            RuntimeError::VersionTooLow { .. } | RuntimeError::VersionMismatch { .. }
        )
    }
}
