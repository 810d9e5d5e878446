//! Build attempt execution and output capture.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::command::BuildCommand;
use crate::error::{BuildError, BuildResult};

/// Captured result of one build attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutput {
    /// Exit code (0 = success, -1 = killed/timed out).
    pub exit_code: i32,

    /// Combined stdout and stderr, in arrival order per line.
    pub output: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl AttemptOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a single build attempt.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &BuildCommand) -> BuildResult<AttemptOutput>;
}

/// Runner that spawns the command as a child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner {
    /// Echo each captured line to the log at debug level.
    pub echo: bool,
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &BuildCommand) -> BuildResult<AttemptOutput> {
        let start = Instant::now();
        let program = command.program()?;

        let mut child = Command::new(program)
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BuildError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let mut stdout = child.stdout.take().map(LineStream::new);
        let mut stderr = child.stderr.take().map(LineStream::new);
        let echo = self.echo;
        let mut captured = String::new();

        let bounded = async {
            while stdout.is_some() || stderr.is_some() {
                let line = tokio::select! {
                    line = next_line(&mut stdout), if stdout.is_some() => line,
                    line = next_line(&mut stderr), if stderr.is_some() => line,
                };
                if let Some(line) = line {
                    if echo {
                        debug!(target: "deskpack::build", "{line}");
                    }
                    captured.push_str(&line);
                    captured.push('\n');
                }
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>(status.code().unwrap_or(-1))
        };

        let exit_code = if command.timeout_secs > 0 {
            let limit = Duration::from_secs(command.timeout_secs);
            let result = tokio::time::timeout(limit, bounded).await;
            match result {
                Ok(result) => result?,
                Err(_) => {
                    captured.push_str(&format!(
                        "deskpack: build attempt timed out after {} seconds\n",
                        command.timeout_secs
                    ));
                    -1
                }
            }
        } else {
            bounded.await?
        };

        Ok(AttemptOutput {
            exit_code,
            output: captured,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Line reader over raw bytes; invalid UTF-8 is replaced, never fatal.
struct LineStream<R> {
    reader: BufReader<R>,
    /// Bytes of the current line, kept across cancelled reads.
    pending: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineStream<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            pending: Vec::new(),
        }
    }

    fn take_line(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let mut bytes = std::mem::take(&mut self.pending);
        if bytes.last() == Some(&b'\n') {
            bytes.pop();
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
        }
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Next line from an optional stream; clears the stream at EOF or on an
/// I/O error, returning any partial last line first.
async fn next_line<R: AsyncRead + Unpin>(stream: &mut Option<LineStream<R>>) -> Option<String> {
    let inner = stream.as_mut()?;
    match inner.reader.read_until(b'\n', &mut inner.pending).await {
        Ok(0) => {
            let rest = inner.take_line();
            *stream = None;
            rest
        }
        Ok(_) => inner.take_line(),
        Err(e) => {
            debug!(error = %e, "build output stream closed");
            let rest = inner.take_line();
            *stream = None;
            rest
        }
    }
}
