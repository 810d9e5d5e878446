//! deskpack CI - build execution for desktop packaging
//!
//! Provides:
//! - A retry controller that reruns the shell build only on transient failures
//! - A pluggable failure classifier (regex signatures by default)
//! - A duplicate-name check for merged release artifacts

pub mod artifacts;
pub mod classifier;
pub mod command;
pub mod error;
pub mod fakes;
pub mod retry;
pub mod runner;

// Re-export key types
pub use artifacts::check_unique_artifact_names;
pub use classifier::{FailureClass, FailureClassifier, SignatureClassifier};
pub use command::{BuildCommand, BUNDLES_KEY};
pub use error::{BuildError, BuildResult, FatalReason};
pub use retry::{run_with_retry, RetryOutcome, RetryPolicy, RetryState};
pub use runner::{AttemptOutput, CommandRunner, ProcessRunner};
