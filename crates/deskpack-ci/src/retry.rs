//! Retry controller for a single packaging invocation.
//!
//! ```text
//! Attempting(n) --exit 0--> Success
//! Attempting(n) --exit != 0--> Classify
//! Classify --transient, n < max--> (sleep) Attempting(n+1)
//! Classify --fatal or n == max--> Fatal
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::classifier::{FailureClass, FailureClassifier};
use crate::command::BuildCommand;
use crate::error::{BuildError, BuildResult, FatalReason};
use crate::runner::{AttemptOutput, CommandRunner};

/// Environment key for the maximum number of build attempts.
pub const MAX_ATTEMPTS_KEY: &str = "DESKPACK_BUILD_MAX_ATTEMPTS";

/// Environment key for the delay between build attempts, in seconds.
pub const RETRY_DELAY_KEY: &str = "DESKPACK_BUILD_RETRY_DELAY_SECS";

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Hard ceiling on attempts regardless of configuration.
pub const MAX_ATTEMPTS_CEILING: u32 = 6;

pub const DEFAULT_RETRY_DELAY_SECS: u64 = 8;

/// Bounds for the retry loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first (1..=MAX_ATTEMPTS_CEILING).
    pub max_attempts: u32,
    /// Fixed delay before each retry.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    /// Build a policy from raw configuration strings, never failing.
    pub fn from_raw(max_attempts: Option<&str>, retry_delay: Option<&str>) -> Self {
        Self {
            max_attempts: parse_max_attempts(max_attempts),
            retry_delay: parse_retry_delay(retry_delay),
        }
    }
}

/// Missing, non-numeric, zero or negative input yields the default; large
/// values clamp to the ceiling.
pub fn parse_max_attempts(raw: Option<&str>) -> u32 {
    match raw.map(str::trim).and_then(|s| s.parse::<i64>().ok()) {
        Some(n) if n >= 1 => n.min(MAX_ATTEMPTS_CEILING as i64) as u32,
        _ => DEFAULT_MAX_ATTEMPTS,
    }
}

/// Non-negative whole seconds; anything else yields the default.
pub fn parse_retry_delay(raw: Option<&str>) -> Duration {
    let secs = raw
        .map(str::trim)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_DELAY_SECS);
    Duration::from_secs(secs)
}

/// States of the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    Attempting(u32),
    Classify { attempt: u32, result: AttemptOutput },
    Success { attempts: u32 },
    Fatal {
        attempts: u32,
        reason: FatalReason,
        result: AttemptOutput,
    },
}

/// Terminal success of a retried build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryOutcome {
    /// Attempts executed, the successful one included.
    pub attempts: u32,
}

/// Run `command` until it succeeds, fails fatally, or exhausts attempts.
///
/// Spawn failures are returned immediately; they are configuration
/// problems, not build failures.
pub async fn run_with_retry(
    command: &BuildCommand,
    policy: &RetryPolicy,
    runner: &dyn CommandRunner,
    classifier: &dyn FailureClassifier,
) -> BuildResult<RetryOutcome> {
    let max_attempts = policy.max_attempts.clamp(1, MAX_ATTEMPTS_CEILING);
    let mut state = RetryState::Attempting(1);

    loop {
        state = match state {
            RetryState::Attempting(attempt) => {
                info!(
                    event = "build.attempt",
                    build = %command.name,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    command = %command.display(),
                );
                let result = runner.run(command).await?;
                if result.succeeded() {
                    RetryState::Success { attempts: attempt }
                } else {
                    RetryState::Classify { attempt, result }
                }
            }
            RetryState::Classify { attempt, result } => {
                match classifier.classify(&result.output) {
                    FailureClass::Fatal => RetryState::Fatal {
                        attempts: attempt,
                        reason: FatalReason::NonTransient,
                        result,
                    },
                    FailureClass::Transient if attempt >= max_attempts => RetryState::Fatal {
                        attempts: attempt,
                        reason: FatalReason::AttemptsExhausted,
                        result,
                    },
                    FailureClass::Transient => {
                        warn!(
                            event = "build.transient_failure",
                            build = %command.name,
                            attempt = attempt,
                            exit_code = result.exit_code,
                            retry_in_secs = policy.retry_delay.as_secs(),
                        );
                        tokio::time::sleep(policy.retry_delay).await;
                        RetryState::Attempting(attempt + 1)
                    }
                }
            }
            RetryState::Success { attempts } => {
                info!(event = "build.succeeded", build = %command.name, attempts = attempts);
                return Ok(RetryOutcome { attempts });
            }
            RetryState::Fatal {
                attempts,
                reason,
                result,
            } => {
                error!(
                    event = "build.failed",
                    build = %command.name,
                    attempts = attempts,
                    exit_code = result.exit_code,
                    reason = %reason,
                );
                error!("Last attempt output:\n{}", result.output);
                return Err(BuildError::Fatal {
                    attempts,
                    exit_code: result.exit_code,
                    reason,
                    output: result.output,
                });
            }
        };
    }
}
