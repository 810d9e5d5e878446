//! Parsers for `mount` and `hdiutil info` output.

use serde::{Deserialize, Serialize};

/// Prefix of the throwaway mount points the bundler creates under `/Volumes`.
pub const DISPOSABLE_MOUNT_PREFIX: &str = "dmg.";

/// One line of `mount` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountRecord {
    pub device: String,
    pub mount_point: String,
}

impl MountRecord {
    /// True when the last component of the mount point starts with `dmg.`.
    pub fn is_disposable(&self) -> bool {
        self.mount_point
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .is_some_and(|name| name.starts_with(DISPOSABLE_MOUNT_PREFIX))
    }
}

/// One attached image from `hdiutil info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskImageRecord {
    pub image_path: String,
    /// Whole-disk device node, e.g. `/dev/disk4`
    pub device: Option<String>,
    /// Pid of the helper process serving the image
    pub pid: Option<u32>,
}

/// Parse `mount` output lines of the form `<device> on <mount point> (<opts>)`.
///
/// Lines that do not fit the shape are skipped.
pub fn parse_mount_output(output: &str) -> Vec<MountRecord> {
    output
        .lines()
        .filter_map(|line| {
            let (device, rest) = line.split_once(" on ")?;
            let mount_point = match rest.rfind(" (") {
                Some(idx) => &rest[..idx],
                None => rest,
            };
            let mount_point = mount_point.trim();
            if device.trim().is_empty() || mount_point.is_empty() {
                return None;
            }
            Some(MountRecord {
                device: device.trim().to_string(),
                mount_point: mount_point.to_string(),
            })
        })
        .collect()
}

/// Parse `hdiutil info` output into one record per attached image.
///
/// Images are separated by a line of `=` characters. Within a block the
/// `image-path` and `process ID` keys are read, and the first `/dev/` line
/// gives the device.
pub fn parse_hdiutil_info(output: &str) -> Vec<DiskImageRecord> {
    let mut records = Vec::new();
    let mut current: Option<DiskImageRecord> = None;

    for line in output.lines() {
        let trimmed = line.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c == '=') {
            records.extend(current.take());
            continue;
        }

        if let Some(dev) = trimmed.strip_prefix("/dev/") {
            if let Some(record) = current.as_mut() {
                if record.device.is_none() {
                    let node = dev.split_whitespace().next().unwrap_or_default();
                    if !node.is_empty() {
                        record.device = Some(format!("/dev/{node}"));
                    }
                }
            }
            continue;
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "image-path" => {
                records.extend(current.take());
                current = Some(DiskImageRecord {
                    image_path: value.to_string(),
                    device: None,
                    pid: None,
                });
            }
            "process ID" => {
                if let Some(record) = current.as_mut() {
                    record.pid = value.parse().ok();
                }
            }
            _ => {}
        }
    }
    records.extend(current);
    records
}
