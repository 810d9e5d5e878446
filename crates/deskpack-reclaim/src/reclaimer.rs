//! Best-effort cleanup of disk images left attached by earlier bundling runs.
//!
//! A run makes three passes:
//!
//! 1. detach every disposable `dmg.*` mount point,
//! 2. detach scratch images owned by the workspace and collect their helper pids,
//! 3. stop those helpers with TERM, then KILL once the grace period lapses.
//!
//! Nothing here fails the caller. Host errors are logged and skipped.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::canonical::PathCanonicalizer;
use crate::config::ReclaimConfig;
use crate::host::SystemHost;
use crate::ownership::{image_is_owned, WorkspaceRoots};

const TERM_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What a reclaim run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimReport {
    /// True when no usable workspace root was configured.
    pub skipped: bool,
    pub mounts_detached: Vec<String>,
    pub images_detached: Vec<String>,
    pub pids_terminated: Vec<u32>,
    /// Pids that needed KILL after TERM.
    pub pids_killed: Vec<u32>,
    pub global_helpers_killed: bool,
    /// Host operations that failed and were skipped.
    pub failures: u32,
}

impl ReclaimReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Runs the reclaim passes against a [`SystemHost`].
pub struct Reclaimer<H: SystemHost> {
    host: H,
    config: ReclaimConfig,
}

impl<H: SystemHost> Reclaimer<H> {
    pub fn new(host: H, config: ReclaimConfig) -> Self {
        Self { host, config }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Run all passes once. Path resolutions are cached for this run only.
    pub fn reclaim(&self) -> ReclaimReport {
        let Some(root) = self.workspace_root() else {
            return ReclaimReport::skipped();
        };

        let canonicalizer = PathCanonicalizer::new();
        let raw_root = root.to_string_lossy().into_owned();
        let roots = WorkspaceRoots::new(
            raw_root.clone(),
            canonicalizer.canonicalize(&self.host, &raw_root),
        );
        info!(
            event = "reclaim.started",
            root = %roots.raw,
            canonical_root = %roots.canonical,
        );

        let mut report = ReclaimReport::default();
        self.sweep_mounts(&mut report);
        let owned_pids = self.sweep_images(&roots, &canonicalizer, &mut report);
        self.stop_helpers(&owned_pids, &mut report);

        if self.config.global_helper_cleanup && owned_pids.is_empty() {
            match self.host.kill_helpers_by_name() {
                Ok(matched) => {
                    report.global_helpers_killed = matched;
                    info!(event = "reclaim.global_helpers", matched = matched);
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(event = "reclaim.global_helpers_failed", error = %e);
                }
            }
        }

        info!(
            event = "reclaim.finished",
            mounts = report.mounts_detached.len(),
            images = report.images_detached.len(),
            terminated = report.pids_terminated.len(),
            killed = report.pids_killed.len(),
            failures = report.failures,
        );
        report
    }

    fn workspace_root(&self) -> Option<PathBuf> {
        let Some(root) = self.config.workspace_root.clone() else {
            warn!(
                event = "reclaim.skipped",
                "no workspace root configured; skipping disk image cleanup"
            );
            return None;
        };
        if !root.exists() {
            warn!(
                event = "reclaim.skipped",
                root = %root.display(),
                "workspace root does not exist; skipping disk image cleanup"
            );
            return None;
        }
        Some(root)
    }

    fn sweep_mounts(&self, report: &mut ReclaimReport) {
        let mounts = match self.host.list_mounts() {
            Ok(mounts) => mounts,
            Err(e) => {
                report.failures += 1;
                warn!(event = "reclaim.list_mounts_failed", error = %e);
                return;
            }
        };

        for mount in mounts.iter().filter(|m| m.is_disposable()) {
            if self.detach_with_retry(&mount.mount_point) {
                report.mounts_detached.push(mount.mount_point.clone());
            } else {
                report.failures += 1;
            }
        }
    }

    fn sweep_images(
        &self,
        roots: &WorkspaceRoots,
        canonicalizer: &PathCanonicalizer,
        report: &mut ReclaimReport,
    ) -> BTreeSet<u32> {
        let mut owned_pids = BTreeSet::new();
        let images = match self.host.list_images() {
            Ok(images) => images,
            Err(e) => {
                report.failures += 1;
                warn!(event = "reclaim.list_images_failed", error = %e);
                return owned_pids;
            }
        };

        let mut seen_devices = BTreeSet::new();
        for image in images {
            let canonical = canonicalizer.canonicalize(&self.host, &image.image_path);
            if !image_is_owned(&image.image_path, &canonical, roots) {
                debug!(event = "reclaim.image_foreign", image = %image.image_path);
                continue;
            }

            info!(
                event = "reclaim.image_owned",
                image = %image.image_path,
                device = image.device.as_deref().unwrap_or("-"),
                pid = ?image.pid,
            );
            if let Some(pid) = image.pid {
                owned_pids.insert(pid);
            }
            let Some(device) = image.device else {
                continue;
            };
            if !seen_devices.insert(device.clone()) {
                continue;
            }
            if self.detach_with_retry(&device) {
                report.images_detached.push(device);
            } else {
                report.failures += 1;
            }
        }
        owned_pids
    }

    fn stop_helpers(&self, pids: &BTreeSet<u32>, report: &mut ReclaimReport) {
        for &pid in pids {
            if let Err(e) = self.host.terminate(pid) {
                warn!(event = "reclaim.term_failed", pid = pid, error = %e);
            }
            report.pids_terminated.push(pid);

            if !self.wait_for_exit(pid) {
                match self.host.kill(pid) {
                    Ok(()) => {
                        warn!(event = "reclaim.killed", pid = pid, "helper ignored TERM");
                        report.pids_killed.push(pid);
                    }
                    Err(e) => {
                        report.failures += 1;
                        warn!(event = "reclaim.kill_failed", pid = pid, error = %e);
                    }
                }
            }
        }
    }

    /// Poll until `pid` exits or the grace period lapses. True if it exited.
    fn wait_for_exit(&self, pid: u32) -> bool {
        let deadline = Instant::now() + self.config.term_grace;
        loop {
            if !self.host.is_alive(pid) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(TERM_POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Graceful detach first, forced on every later attempt.
    fn detach_with_retry(&self, target: &str) -> bool {
        let attempts = self.config.detach_attempts.max(1);
        for attempt in 1..=attempts {
            let force = attempt > 1;
            match self.host.detach(target, force) {
                Ok(()) => {
                    info!(
                        event = "reclaim.detached",
                        mount = target,
                        attempt = attempt,
                        force = force
                    );
                    return true;
                }
                Err(e) => {
                    debug!(
                        event = "reclaim.detach_attempt_failed",
                        mount = target,
                        attempt = attempt,
                        error = %e,
                    );
                    if attempt < attempts && !self.config.detach_delay.is_zero() {
                        std::thread::sleep(self.config.detach_delay);
                    }
                }
            }
        }
        warn!(
            event = "reclaim.detach_exhausted",
            mount = target,
            attempts = attempts,
            "could not detach; leaving it attached"
        );
        false
    }
}
