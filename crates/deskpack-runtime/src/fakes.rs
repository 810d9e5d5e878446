//! In-memory fakes for the probe capability (testing only)
//!
//! `FakeProber` answers manifest reads and snippet runs from canned values
//! and counts calls, so resolver behaviour can be tested without spawning
//! interpreters.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::prober::{ManifestReading, ProbeError, Prober};

/// Scripted prober.
#[derive(Debug)]
pub struct FakeProber {
    manifest: Mutex<Result<ManifestReading, ProbeError>>,
    snippets: Mutex<HashMap<String, Result<String, ProbeError>>>,
    manifest_reads: AtomicUsize,
    snippet_runs: AtomicUsize,
}

impl Default for FakeProber {
    fn default() -> Self {
        FakeProber {
            manifest: Mutex::new(Ok(ManifestReading::default())),
            snippets: Mutex::new(HashMap::new()),
            manifest_reads: AtomicUsize::new(0),
            snippet_runs: AtomicUsize::new(0),
        }
    }
}

impl FakeProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer manifest reads with `requires-python = specifier`.
    pub fn with_requires_python(self, specifier: &str) -> Self {
        self.with_manifest(Ok(ManifestReading {
            requires_python: Some(specifier.to_string()),
            ..ManifestReading::default()
        }))
    }

    pub fn with_manifest(self, reading: Result<ManifestReading, ProbeError>) -> Self {
        *self.manifest.lock().unwrap() = reading;
        self
    }

    /// Interpreter reports `major.minor`; ssl and pip imports succeed.
    pub fn with_runtime_version(self, version: &str) -> Self {
        self.with_snippet(crate::prober::VERSION_SNIPPET, Ok(version.to_string()))
            .with_snippet("import ssl", Ok(String::new()))
            .with_snippet("import pip", Ok(String::new()))
    }

    pub fn with_snippet(self, snippet: &str, result: Result<String, ProbeError>) -> Self {
        self.snippets
            .lock()
            .unwrap()
            .insert(snippet.to_string(), result);
        self
    }

    pub fn manifest_reads(&self) -> usize {
        self.manifest_reads.load(Ordering::SeqCst)
    }

    pub fn snippet_runs(&self) -> usize {
        self.snippet_runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn read_requires_python(&self, _manifest: &Path) -> Result<ManifestReading, ProbeError> {
        self.manifest_reads.fetch_add(1, Ordering::SeqCst);
        self.manifest.lock().unwrap().clone()
    }

    async fn run_snippet(
        &self,
        _interpreter: &Path,
        snippet: &str,
        _timeout: Duration,
    ) -> Result<String, ProbeError> {
        self.snippet_runs.fetch_add(1, Ordering::SeqCst);
        self.snippets
            .lock()
            .unwrap()
            .get(snippet)
            .cloned()
            .unwrap_or_else(|| {
                Err(ProbeError::Failed(format!("no scripted answer for {snippet:?}")))
            })
    }
}
