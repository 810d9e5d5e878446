//! Build command definitions.

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, BuildResult};

/// Environment key carrying the bundle targets for the shell build.
pub const BUNDLES_KEY: &str = "DESKPACK_BUNDLES";

/// A packaging command to run under the retry controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildCommand {
    /// Human-readable name used in logs.
    pub name: String,

    /// Command to execute (first element is executable).
    pub argv: Vec<String>,

    /// Bundle targets appended as `--bundles a,b`.
    pub bundles: Vec<String>,

    /// Per-attempt timeout in seconds (0 = unbounded).
    pub timeout_secs: u64,
}

impl BuildCommand {
    /// Create a build command from an argv; fails if it is empty.
    pub fn new(name: impl Into<String>, argv: Vec<String>) -> BuildResult<Self> {
        if argv.first().map_or(true, |exe| exe.trim().is_empty()) {
            return Err(BuildError::EmptyCommand);
        }
        Ok(Self {
            name: name.into(),
            argv,
            bundles: Vec::new(),
            timeout_secs: 0,
        })
    }

    /// Attach bundle targets from a comma- or whitespace-separated list.
    pub fn with_bundles(mut self, raw: Option<&str>) -> Self {
        self.bundles = parse_bundle_list(raw.unwrap_or_default());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Executable to spawn.
    ///
    /// Fails on an empty argv, which only a deserialized or hand-built
    /// command can carry.
    pub fn program(&self) -> BuildResult<&str> {
        self.argv
            .first()
            .map(String::as_str)
            .filter(|exe| !exe.trim().is_empty())
            .ok_or(BuildError::EmptyCommand)
    }

    /// Arguments after the executable, bundle flag included.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.argv.get(1..).unwrap_or_default().to_vec();
        if !self.bundles.is_empty() {
            args.push("--bundles".to_string());
            args.push(self.bundles.join(","));
        }
        args
    }

    /// Printable command line.
    pub fn display(&self) -> String {
        self.argv
            .first()
            .cloned()
            .into_iter()
            .chain(self.args())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn parse_bundle_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
