//! deskpack-runtime: managed Python runtime checks for desktop packaging
//!
//! This crate decides whether an externally supplied Python distribution may
//! be embedded in a desktop bundle:
//!
//! - [`source`]: reject runtime directories that overlap the build output,
//!   swallow the project root, or are virtual environments
//! - [`resolver`]: work out the required `major.minor` (explicit override or
//!   `requires-python`) and probe the candidate interpreter against it
//! - [`layout`]: find the interpreter inside a runtime directory
//!
//! Process probing goes through the [`Prober`] trait; [`fakes`] has a
//! scripted implementation for tests.

pub mod error;
pub mod fakes;
pub mod layout;
pub mod prober;
pub mod resolver;
pub mod source;
pub mod version;

pub use error::RuntimeError;
pub use layout::locate_interpreter;
pub use prober::{ManifestReading, ProbeError, Prober, ProcessProber, PROBE_TIMEOUT};
pub use resolver::{
    check_compatibility, resolve_expected_version, validate_runtime_version, ProbeOptions,
    ProbeResult, MANIFEST_FILE, PYTHON_VERSION_KEY,
};
pub use source::{validate_runtime_source, RuntimeSource, RUNTIME_SOURCE_KEY, VENV_MARKER};
pub use version::{Provenance, PythonVersion, VersionConstraint};

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;
