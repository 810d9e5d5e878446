//! Version constraint resolution and runtime compatibility checks
//!
//! Resolution order:
//! 1. An explicit `major.minor` override (exact match required)
//! 2. `project.requires-python` of the backend source's `pyproject.toml`,
//!    reduced to its tightest lower bound
//!
//! Validation then probes the candidate interpreter and compares.

use crate::error::RuntimeError;
use crate::prober::{ProbeError, Prober, PROBE_TIMEOUT, VERSION_SNIPPET};
use crate::version::{lower_bound_from_specifier, Provenance, PythonVersion, VersionConstraint};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment key for the explicit version override.
pub const PYTHON_VERSION_KEY: &str = "DESKPACK_PYTHON_VERSION";

/// Manifest file read from the backend source directory.
pub const MANIFEST_FILE: &str = "pyproject.toml";

/// Determine the interpreter version a packaged runtime must satisfy.
pub async fn resolve_expected_version(
    source_dir: &Path,
    explicit: Option<&str>,
    prober: &dyn Prober,
) -> Result<VersionConstraint> {
    if let Some(raw) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        let version =
            PythonVersion::parse_strict(raw).ok_or_else(|| RuntimeError::InvalidVersionFormat {
                key: PYTHON_VERSION_KEY,
                value: raw.to_string(),
            })?;
        info!(event = "version.resolved", expected = %version, source = "override");
        return Ok(VersionConstraint::exact(
            version,
            Provenance::ExplicitOverride {
                key: PYTHON_VERSION_KEY.to_string(),
            },
        ));
    }

    let manifest = source_dir.join(MANIFEST_FILE);
    if !manifest.is_file() {
        return Err(unresolved(format!("{} not found", manifest.display())));
    }

    let reading = match prober.read_requires_python(&manifest).await {
        Ok(reading) => reading,
        Err(ProbeError::HelperUnavailable { tried }) => {
            warn!(
                manifest = %manifest.display(),
                tried = %tried,
                "No interpreter available to read requires-python"
            );
            return Err(unresolved(format!(
                "no interpreter available to read {}",
                manifest.display()
            )));
        }
        Err(err) => {
            return Err(RuntimeError::ManifestReadFailed {
                path: manifest,
                code: "helper_failed".to_string(),
                message: err.to_string(),
            })
        }
    };

    if let Some(code) = reading.error {
        return Err(RuntimeError::ManifestReadFailed {
            path: manifest,
            message: reading.message.unwrap_or_else(|| code.clone()),
            code,
        });
    }

    let specifier = reading
        .requires_python
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            unresolved(format!(
                "project.requires-python is not set in {}",
                manifest.display()
            ))
        })?;

    let version = lower_bound_from_specifier(&specifier).ok_or_else(|| {
        unresolved(format!("requires-python {specifier:?} has no lower bound"))
    })?;

    info!(
        event = "version.resolved",
        expected = %version,
        specifier = %specifier,
        source = "manifest"
    );
    Ok(VersionConstraint::at_least(
        version,
        Provenance::Manifest {
            path: manifest,
            specifier,
        },
    ))
}

fn unresolved(reason: String) -> RuntimeError {
    RuntimeError::UnresolvedConstraint {
        key: PYTHON_VERSION_KEY,
        reason,
    }
}

/// Which probes to run against a candidate runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOptions {
    /// `import ssl` must succeed
    pub require_ssl: bool,
    /// `import pip` must succeed
    pub require_pip: bool,
    pub timeout: Duration,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        ProbeOptions {
            require_ssl: true,
            require_pip: false,
            timeout: PROBE_TIMEOUT,
        }
    }
}

/// Version actually reported by a probed interpreter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub interpreter: PathBuf,
    pub version: PythonVersion,
}

/// Probe `interpreter` and check it against `constraint`.
pub async fn validate_runtime_version(
    interpreter: &Path,
    constraint: &VersionConstraint,
    options: &ProbeOptions,
    prober: &dyn Prober,
) -> Result<ProbeResult> {
    let raw = run_probe(prober, interpreter, "version", VERSION_SNIPPET, options.timeout).await?;
    let version = PythonVersion::parse_strict(&raw).ok_or_else(|| RuntimeError::ProbeFailed {
        interpreter: interpreter.to_path_buf(),
        label: "version",
        reason: format!("unexpected output {raw:?}"),
    })?;
    debug!(interpreter = %interpreter.display(), actual = %version, "Runtime version probed");

    check_compatibility(constraint, version)?;

    if options.require_ssl {
        run_probe(prober, interpreter, "ssl", "import ssl", options.timeout).await?;
    }
    if options.require_pip {
        run_probe(prober, interpreter, "pip", "import pip", options.timeout).await?;
    }

    info!(
        event = "runtime.compatible",
        interpreter = %interpreter.display(),
        actual = %version,
        expected = %constraint.version,
        lower_bound = constraint.is_lower_bound
    );
    Ok(ProbeResult {
        interpreter: interpreter.to_path_buf(),
        version,
    })
}

/// Compare a probed version against a constraint.
pub fn check_compatibility(constraint: &VersionConstraint, actual: PythonVersion) -> Result<()> {
    if constraint.is_satisfied_by(actual) {
        return Ok(());
    }
    let expected = constraint.version;
    let provenance = constraint.provenance.clone();
    if constraint.is_lower_bound {
        Err(RuntimeError::VersionTooLow {
            expected,
            actual,
            provenance,
        })
    } else {
        Err(RuntimeError::VersionMismatch {
            expected,
            actual,
            provenance,
        })
    }
}

async fn run_probe(
    prober: &dyn Prober,
    interpreter: &Path,
    label: &'static str,
    snippet: &str,
    timeout: Duration,
) -> Result<String> {
    prober
        .run_snippet(interpreter, snippet, timeout)
        .await
        .map_err(|err| RuntimeError::ProbeFailed {
            interpreter: interpreter.to_path_buf(),
            label,
            reason: err.to_string(),
        })
}
