//! Error types for build execution.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Why a build ended in the fatal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalReason {
    /// Output matched no transient signature
    NonTransient,
    /// Every attempt failed transiently
    AttemptsExhausted,
}

impl std::fmt::Display for FatalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FatalReason::NonTransient => write!(f, "non-transient failure"),
            FatalReason::AttemptsExhausted => write!(f, "transient failures exhausted all attempts"),
        }
    }
}

/// Errors produced by the build layer.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("build command is empty")]
    EmptyCommand,

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("build failed after {attempts} attempt(s) with exit code {exit_code} ({reason})")]
    Fatal {
        attempts: u32,
        exit_code: i32,
        reason: FatalReason,
        /// Full captured output of the last attempt
        output: String,
    },

    #[error("artifacts directory not found: {}", .0.display())]
    ArtifactsDirMissing(PathBuf),

    #[error("artifacts path is not a directory: {}", .0.display())]
    ArtifactsNotDirectory(PathBuf),

    #[error("duplicate artifact file names detected: {}", .duplicates.keys().cloned().collect::<Vec<_>>().join(", "))]
    DuplicateArtifacts {
        duplicates: BTreeMap<String, Vec<PathBuf>>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for build operations.
pub type BuildResult<T> = std::result::Result<T, BuildError>;
