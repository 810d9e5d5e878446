//! In-memory host for reclaimer tests (testing only)
//!
//! `FakeHost` records every call so tests can assert what the reclaimer
//! touched without any real mounts or processes.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use crate::error::{HostError, HostResult};
use crate::host::SystemHost;
use crate::inventory::{DiskImageRecord, MountRecord};

#[derive(Debug, Default)]
struct FakeState {
    alive: BTreeSet<u32>,
    detach_failures: HashMap<String, u32>,
    detach_calls: Vec<(String, bool)>,
    terminated: Vec<u32>,
    killed: Vec<u32>,
    resolve_calls: u32,
    listing_calls: u32,
    global_kills: u32,
}

/// Scriptable [`SystemHost`].
#[derive(Debug, Default)]
pub struct FakeHost {
    mounts: Vec<MountRecord>,
    images: Vec<DiskImageRecord>,
    resolutions: HashMap<String, String>,
    resolver_missing: bool,
    listing_broken: bool,
    stubborn: BTreeSet<u32>,
    state: Mutex<FakeState>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mount(mut self, device: &str, mount_point: &str) -> Self {
        self.mounts.push(MountRecord {
            device: device.to_string(),
            mount_point: mount_point.to_string(),
        });
        self
    }

    /// Attach an image; a pid is registered as a live process.
    pub fn with_image(mut self, image_path: &str, device: Option<&str>, pid: Option<u32>) -> Self {
        self.images.push(DiskImageRecord {
            image_path: image_path.to_string(),
            device: device.map(str::to_string),
            pid,
        });
        if let Some(pid) = pid {
            self.state.get_mut().unwrap().alive.insert(pid);
        }
        self
    }

    pub fn with_resolution(mut self, raw: &str, resolved: &str) -> Self {
        self.resolutions.insert(raw.to_string(), resolved.to_string());
        self
    }

    /// Make `resolve_path` report the resolver tool as missing.
    pub fn without_resolver(mut self) -> Self {
        self.resolver_missing = true;
        self
    }

    /// Make both listings fail.
    pub fn with_broken_listing(mut self) -> Self {
        self.listing_broken = true;
        self
    }

    /// Fail the first `times` detach calls for `target`.
    pub fn failing_detach(mut self, target: &str, times: u32) -> Self {
        self.state
            .get_mut()
            .unwrap()
            .detach_failures
            .insert(target.to_string(), times);
        self
    }

    /// A live pid that survives TERM.
    pub fn with_stubborn_pid(mut self, pid: u32) -> Self {
        self.stubborn.insert(pid);
        self.state.get_mut().unwrap().alive.insert(pid);
        self
    }

    pub fn detach_calls(&self) -> Vec<(String, bool)> {
        self.state.lock().unwrap().detach_calls.clone()
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.state.lock().unwrap().terminated.clone()
    }

    pub fn killed(&self) -> Vec<u32> {
        self.state.lock().unwrap().killed.clone()
    }

    pub fn resolve_calls(&self) -> u32 {
        self.state.lock().unwrap().resolve_calls
    }

    pub fn global_kills(&self) -> u32 {
        self.state.lock().unwrap().global_kills
    }

    /// Total host interactions of any kind.
    pub fn total_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.detach_calls.len()
            + state.terminated.len()
            + state.killed.len()
            + state.resolve_calls as usize
            + state.listing_calls as usize
            + state.global_kills as usize
    }

    fn broken(tool: &str) -> HostError {
        HostError::CommandFailed {
            tool: tool.to_string(),
            status: "exit status: 1".to_string(),
            stderr: "listing unavailable".to_string(),
        }
    }
}

impl SystemHost for FakeHost {
    fn list_mounts(&self) -> HostResult<Vec<MountRecord>> {
        self.state.lock().unwrap().listing_calls += 1;
        if self.listing_broken {
            return Err(Self::broken("mount"));
        }
        Ok(self.mounts.clone())
    }

    fn list_images(&self) -> HostResult<Vec<DiskImageRecord>> {
        self.state.lock().unwrap().listing_calls += 1;
        if self.listing_broken {
            return Err(Self::broken("hdiutil"));
        }
        Ok(self.images.clone())
    }

    fn detach(&self, target: &str, force: bool) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        state.detach_calls.push((target.to_string(), force));
        if let Some(remaining) = state.detach_failures.get_mut(target) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(HostError::CommandFailed {
                    tool: "hdiutil".to_string(),
                    status: "exit status: 16".to_string(),
                    stderr: "resource busy".to_string(),
                });
            }
        }
        Ok(())
    }

    fn terminate(&self, pid: u32) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        state.terminated.push(pid);
        if !self.stubborn.contains(&pid) {
            state.alive.remove(&pid);
        }
        Ok(())
    }

    fn kill(&self, pid: u32) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        state.killed.push(pid);
        state.alive.remove(&pid);
        Ok(())
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.state.lock().unwrap().alive.contains(&pid)
    }

    fn resolve_path(&self, raw: &str) -> HostResult<Option<String>> {
        self.state.lock().unwrap().resolve_calls += 1;
        if self.resolver_missing {
            return Err(HostError::ToolUnavailable {
                tool: "realpath".to_string(),
            });
        }
        Ok(self.resolutions.get(raw).cloned())
    }

    fn kill_helpers_by_name(&self) -> HostResult<bool> {
        self.state.lock().unwrap().global_kills += 1;
        Ok(true)
    }
}
