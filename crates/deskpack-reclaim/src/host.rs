//! Host capabilities used by the reclaimer.
//!
//! [`MacHost`] shells out to the stock macOS tools. Tests use
//! [`crate::fakes::FakeHost`] instead.

use std::process::{Command, Output};

use crate::error::{HostError, HostResult};
use crate::inventory::{parse_hdiutil_info, parse_mount_output, DiskImageRecord, MountRecord};

/// Name of the macOS process that serves attached disk images.
pub const DISK_IMAGE_HELPER: &str = "diskimages-helper";

/// Operations the reclaimer needs from the host.
pub trait SystemHost {
    fn list_mounts(&self) -> HostResult<Vec<MountRecord>>;

    fn list_images(&self) -> HostResult<Vec<DiskImageRecord>>;

    /// Detach a mount point or device node.
    fn detach(&self, target: &str, force: bool) -> HostResult<()>;

    /// Send TERM to `pid`.
    fn terminate(&self, pid: u32) -> HostResult<()>;

    /// Send KILL to `pid`.
    fn kill(&self, pid: u32) -> HostResult<()>;

    fn is_alive(&self, pid: u32) -> bool;

    /// Resolve symlinks in `raw`. `Ok(None)` when the path does not resolve.
    fn resolve_path(&self, raw: &str) -> HostResult<Option<String>>;

    /// Kill every process named [`DISK_IMAGE_HELPER`]. Returns whether any
    /// process matched.
    fn kill_helpers_by_name(&self) -> HostResult<bool>;
}

/// The real host, driven through `mount`, `hdiutil`, `kill`, `realpath`
/// and `pkill`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MacHost;

fn run_tool(tool: &str, args: &[&str]) -> HostResult<Output> {
    Command::new(tool).args(args).output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            HostError::ToolUnavailable {
                tool: tool.to_string(),
            }
        } else {
            HostError::Io(e)
        }
    })
}

fn require_success(tool: &str, output: Output) -> HostResult<Output> {
    if output.status.success() {
        return Ok(output);
    }
    Err(HostError::CommandFailed {
        tool: tool.to_string(),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

impl SystemHost for MacHost {
    fn list_mounts(&self) -> HostResult<Vec<MountRecord>> {
        let output = require_success("mount", run_tool("mount", &[])?)?;
        Ok(parse_mount_output(&String::from_utf8_lossy(&output.stdout)))
    }

    fn list_images(&self) -> HostResult<Vec<DiskImageRecord>> {
        let output = require_success("hdiutil", run_tool("hdiutil", &["info"])?)?;
        Ok(parse_hdiutil_info(&String::from_utf8_lossy(&output.stdout)))
    }

    fn detach(&self, target: &str, force: bool) -> HostResult<()> {
        let mut args = vec!["detach", target];
        if force {
            args.push("-force");
        }
        require_success("hdiutil", run_tool("hdiutil", &args)?)?;
        Ok(())
    }

    fn terminate(&self, pid: u32) -> HostResult<()> {
        let pid = pid.to_string();
        require_success("kill", run_tool("kill", &["-TERM", &pid])?)?;
        Ok(())
    }

    fn kill(&self, pid: u32) -> HostResult<()> {
        let pid = pid.to_string();
        require_success("kill", run_tool("kill", &["-KILL", &pid])?)?;
        Ok(())
    }

    fn is_alive(&self, pid: u32) -> bool {
        run_tool("kill", &["-0", &pid.to_string()])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn resolve_path(&self, raw: &str) -> HostResult<Option<String>> {
        let output = run_tool("realpath", &[raw])?;
        if !output.status.success() {
            return Ok(None);
        }
        let resolved = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!resolved.is_empty()).then_some(resolved))
    }

    fn kill_helpers_by_name(&self) -> HostResult<bool> {
        let output = run_tool("pkill", &["-x", DISK_IMAGE_HELPER])?;
        // pkill exits 1 when nothing matched.
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(HostError::CommandFailed {
                tool: "pkill".to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool_is_unavailable() {
        let err = run_tool("deskpack-no-such-tool", &[]).unwrap_err();
        assert!(
            matches!(err, HostError::ToolUnavailable { tool } if tool == "deskpack-no-such-tool")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_command_carries_stderr() {
        let output = run_tool("sh", &["-c", "echo nope >&2; exit 3"]).unwrap();
        match require_success("sh", output).unwrap_err() {
            HostError::CommandFailed { tool, stderr, .. } => {
                assert_eq!(tool, "sh");
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_current_process_is_alive() {
        assert!(MacHost.is_alive(std::process::id()));
    }
}
