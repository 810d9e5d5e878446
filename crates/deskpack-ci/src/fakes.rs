//! Scripted runner for retry tests (testing only).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::command::BuildCommand;
use crate::error::BuildResult;
use crate::runner::{AttemptOutput, CommandRunner};

/// Replays a fixed sequence of `(exit_code, output)` results.
///
/// Once the script runs out, the last entry repeats.
#[derive(Debug)]
pub struct ScriptedRunner {
    script: Mutex<VecDeque<(i32, String)>>,
    last: Mutex<(i32, String)>,
    calls: AtomicU32,
}

impl ScriptedRunner {
    pub fn new<I, S>(script: I) -> Self
    where
        I: IntoIterator<Item = (i32, S)>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|(code, out)| (code, out.into()))
                    .collect(),
            ),
            last: Mutex::new((0, String::new())),
            calls: AtomicU32::new(0),
        }
    }

    /// Number of attempts executed so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, _command: &BuildCommand) -> BuildResult<AttemptOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        let (exit_code, output) = match next {
            Some(entry) => {
                *self.last.lock().unwrap() = entry.clone();
                entry
            }
            None => self.last.lock().unwrap().clone(),
        };
        Ok(AttemptOutput {
            exit_code,
            output,
            duration_ms: 0,
        })
    }
}
