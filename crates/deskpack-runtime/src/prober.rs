//! External process probes
//!
//! Everything that needs a live Python goes through the [`Prober`] trait:
//! reading `requires-python` out of a manifest with a short-lived helper
//! interpreter, and running fixed snippets inside the candidate runtime.
//! [`ProcessProber`] spawns real processes; tests use `fakes::FakeProber`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Upper bound for any single probe process.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Prints `major.minor` of the running interpreter.
pub const VERSION_SNIPPET: &str =
    "import sys; print(f'{sys.version_info[0]}.{sys.version_info[1]}')";

/// Reads `project.requires-python` from the TOML file named in `argv[1]`
/// and reports a JSON object on stdout. Errors are reported in-band so the
/// caller can tell "field absent" from "could not parse".
pub const MANIFEST_HELPER: &str = r#"
import json, pathlib, sys

def emit(requires_python=None, error=None, message=None):
    payload = {"requires_python": requires_python, "error": error}
    if message:
        payload["message"] = message
    print(json.dumps(payload))

try:
    import tomllib
except Exception:
    try:
        import tomli as tomllib
    except Exception:
        emit(error="toml_parser_unavailable", message="tomllib/tomli is unavailable for parsing pyproject.toml.")
        raise SystemExit(0)

try:
    data = tomllib.loads(pathlib.Path(sys.argv[1]).read_text(encoding="utf-8"))
except Exception as exc:
    emit(error="parse_failed", message=f"Failed to parse pyproject.toml: {exc}")
    raise SystemExit(0)

project = data.get("project") if isinstance(data, dict) else None
requires_python = project.get("requires-python") if isinstance(project, dict) else None
if requires_python is not None and not isinstance(requires_python, str):
    emit(error="invalid_type", message="project.requires-python must be a string.")
    raise SystemExit(0)
emit(requires_python=requires_python)
"#;

/// Structured report from the manifest helper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestReading {
    pub requires_python: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Ways a probe process can fail
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// No interpreter able to run the helper could be spawned
    #[error("no helper interpreter available (tried {tried})")]
    HelperUnavailable { tried: String },

    /// The process did not finish in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Spawn error, non-zero exit, or unusable output
    #[error("{0}")]
    Failed(String),
}

/// Capability for running helper and runtime probes.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Read `requires-python` from the manifest at `manifest`.
    async fn read_requires_python(&self, manifest: &Path) -> Result<ManifestReading, ProbeError>;

    /// Run `snippet` inside `interpreter` and return its trimmed stdout.
    async fn run_snippet(
        &self,
        interpreter: &Path,
        snippet: &str,
        timeout: Duration,
    ) -> Result<String, ProbeError>;
}

/// Prober that spawns real interpreter processes.
#[derive(Debug, Clone)]
pub struct ProcessProber {
    /// Interpreters tried, in order, to run the manifest helper
    pub helper_candidates: Vec<PathBuf>,
    pub timeout: Duration,
}

impl Default for ProcessProber {
    fn default() -> Self {
        let names: &[&str] = if cfg!(windows) {
            &["python", "py", "python3"]
        } else {
            &["python3", "python"]
        };
        ProcessProber {
            helper_candidates: names.iter().map(PathBuf::from).collect(),
            timeout: PROBE_TIMEOUT,
        }
    }
}

impl ProcessProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefer a specific helper interpreter, keeping the defaults as fallback.
    pub fn with_helper(mut self, helper: PathBuf) -> Self {
        self.helper_candidates.insert(0, helper);
        self
    }
}

#[async_trait]
impl Prober for ProcessProber {
    async fn read_requires_python(&self, manifest: &Path) -> Result<ManifestReading, ProbeError> {
        for helper in &self.helper_candidates {
            let mut command = Command::new(helper);
            command.arg("-c").arg(MANIFEST_HELPER).arg(manifest);
            let stdout = match run_bounded(command, self.timeout).await {
                Err(SpawnOutcome::NotFound) => {
                    debug!(helper = %helper.display(), "manifest helper not found, trying next");
                    continue;
                }
                Err(SpawnOutcome::Probe(err)) => return Err(err),
                Ok(stdout) => stdout,
            };
            let line = stdout.lines().last().unwrap_or_default();
            return serde_json::from_str(line).map_err(|e| {
                ProbeError::Failed(format!("unexpected helper output {line:?}: {e}"))
            });
        }

        Err(ProbeError::HelperUnavailable {
            tried: self
                .helper_candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    async fn run_snippet(
        &self,
        interpreter: &Path,
        snippet: &str,
        timeout: Duration,
    ) -> Result<String, ProbeError> {
        let mut command = Command::new(interpreter);
        // Isolated mode: ignore PYTHON* env vars and the user site directory.
        command.arg("-I").arg("-c").arg(snippet);
        match run_bounded(command, timeout).await {
            Ok(stdout) => Ok(stdout),
            Err(SpawnOutcome::NotFound) => Err(ProbeError::Failed(format!(
                "{} is not executable",
                interpreter.display()
            ))),
            Err(SpawnOutcome::Probe(err)) => Err(err),
        }
    }
}

enum SpawnOutcome {
    NotFound,
    Probe(ProbeError),
}

async fn run_bounded(mut command: Command, timeout: Duration) -> Result<String, SpawnOutcome> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(SpawnOutcome::NotFound),
        Err(e) => return Err(SpawnOutcome::Probe(ProbeError::Failed(e.to_string()))),
    };

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| SpawnOutcome::Probe(ProbeError::Timeout(timeout)))?
        .map_err(|e| SpawnOutcome::Probe(ProbeError::Failed(e.to_string())))?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let detail = if !stderr.is_empty() {
            stderr
        } else if !stdout.is_empty() {
            stdout
        } else {
            format!("exit={}", output.status.code().unwrap_or(-1))
        };
        return Err(SpawnOutcome::Probe(ProbeError::Failed(detail)));
    }
    Ok(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_reading_parses_helper_payload() {
        let reading: ManifestReading =
            serde_json::from_str(r#"{"requires_python": ">=3.10", "error": null}"#).unwrap();
        assert_eq!(reading.requires_python.as_deref(), Some(">=3.10"));
        assert!(reading.error.is_none());
        assert!(reading.message.is_none());
    }

    #[test]
    fn test_manifest_reading_parses_error_payload() {
        let reading: ManifestReading = serde_json::from_str(
            r#"{"requires_python": null, "error": "parse_failed", "message": "bad toml"}"#,
        )
        .unwrap();
        assert_eq!(reading.error.as_deref(), Some("parse_failed"));
        assert_eq!(reading.message.as_deref(), Some("bad toml"));
    }

    #[tokio::test]
    async fn test_missing_helper_is_unavailable() {
        let prober = ProcessProber {
            helper_candidates: vec![PathBuf::from("deskpack-no-such-python-binary")],
            timeout: Duration::from_secs(5),
        };
        let err = prober
            .read_requires_python(Path::new("pyproject.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::HelperUnavailable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bounded_run_times_out() {
        let mut command = Command::new("sleep");
        command.arg("5");
        match run_bounded(command, Duration::from_millis(100)).await {
            Err(SpawnOutcome::Probe(ProbeError::Timeout(limit))) => {
                assert_eq!(limit, Duration::from_millis(100));
            }
            _ => panic!("expected a timeout"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bounded_run_reports_stderr_on_failure() {
        let mut command = Command::new("sh");
        command.arg("-c").arg("echo boom >&2; exit 3");
        match run_bounded(command, Duration::from_secs(5)).await {
            Err(SpawnOutcome::Probe(ProbeError::Failed(detail))) => assert_eq!(detail, "boom"),
            _ => panic!("expected a failure"),
        }
    }

    #[tokio::test]
    async fn test_run_snippet_missing_interpreter_fails() {
        let prober = ProcessProber::new();
        let err = prober
            .run_snippet(
                Path::new("/definitely/not/here/python3"),
                VERSION_SNIPPET,
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Failed(_)));
    }
}
