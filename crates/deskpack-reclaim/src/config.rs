//! Reclaimer configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const CLEANUP_ROOT_KEY: &str = "DESKPACK_CLEANUP_ROOT";
/// CI-provided workspace root, used when no explicit root is set.
pub const CI_WORKSPACE_KEY: &str = "GITHUB_WORKSPACE";
pub const DETACH_ATTEMPTS_KEY: &str = "DESKPACK_DETACH_ATTEMPTS";
pub const DETACH_DELAY_KEY: &str = "DESKPACK_DETACH_DELAY_SECS";
pub const GLOBAL_HELPER_CLEANUP_KEY: &str = "DESKPACK_GLOBAL_HELPER_CLEANUP";

pub const DEFAULT_DETACH_ATTEMPTS: u32 = 3;
pub const MAX_DETACH_ATTEMPTS: u32 = 10;
pub const DEFAULT_DETACH_DELAY_SECS: u64 = 2;
pub const DEFAULT_TERM_GRACE: Duration = Duration::from_secs(2);

/// Raw configuration values as read from the environment or flags.
#[derive(Debug, Clone, Default)]
pub struct RawReclaimConfig {
    pub cleanup_root: Option<String>,
    pub ci_workspace: Option<String>,
    pub detach_attempts: Option<String>,
    pub detach_delay: Option<String>,
    pub global_helper_cleanup: Option<String>,
}

impl RawReclaimConfig {
    /// Read every key from the process environment.
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok();
        Self {
            cleanup_root: var(CLEANUP_ROOT_KEY),
            ci_workspace: var(CI_WORKSPACE_KEY),
            detach_attempts: var(DETACH_ATTEMPTS_KEY),
            detach_delay: var(DETACH_DELAY_KEY),
            global_helper_cleanup: var(GLOBAL_HELPER_CLEANUP_KEY),
        }
    }
}

/// Validated reclaimer settings. Construction never fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimConfig {
    pub workspace_root: Option<PathBuf>,
    pub detach_attempts: u32,
    pub detach_delay: Duration,
    /// Wait between TERM and KILL for owned helper processes.
    pub term_grace: Duration,
    pub global_helper_cleanup: bool,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            workspace_root: None,
            detach_attempts: DEFAULT_DETACH_ATTEMPTS,
            detach_delay: Duration::from_secs(DEFAULT_DETACH_DELAY_SECS),
            term_grace: DEFAULT_TERM_GRACE,
            global_helper_cleanup: false,
        }
    }
}

impl ReclaimConfig {
    pub fn from_raw(raw: &RawReclaimConfig) -> Self {
        let workspace_root = [&raw.cleanup_root, &raw.ci_workspace]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .map(PathBuf::from);

        Self {
            workspace_root,
            detach_attempts: parse_detach_attempts(raw.detach_attempts.as_deref()),
            detach_delay: parse_detach_delay(raw.detach_delay.as_deref()),
            term_grace: DEFAULT_TERM_GRACE,
            global_helper_cleanup: raw
                .global_helper_cleanup
                .as_deref()
                .is_some_and(is_truthy),
        }
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// Zero all waits. Used by tests and dry environments.
    pub fn without_delays(mut self) -> Self {
        self.detach_delay = Duration::ZERO;
        self.term_grace = Duration::ZERO;
        self
    }
}

/// Invalid input yields the default; valid input clamps to `1..=10`.
pub fn parse_detach_attempts(raw: Option<&str>) -> u32 {
    match raw.map(str::trim).and_then(|s| s.parse::<i64>().ok()) {
        Some(n) => n.clamp(1, MAX_DETACH_ATTEMPTS as i64) as u32,
        None => DEFAULT_DETACH_ATTEMPTS,
    }
}

pub fn parse_detach_delay(raw: Option<&str>) -> Duration {
    Duration::from_secs(
        raw.map(str::trim)
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_DETACH_DELAY_SECS),
    )
}

/// `1`, `true`, `yes` and `on`, case-insensitive.
pub fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
