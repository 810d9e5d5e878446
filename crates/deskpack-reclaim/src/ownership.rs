//! Rules deciding whether a disk image belongs to this workspace.

use std::sync::OnceLock;

use regex::Regex;

/// Bundler scratch images: `.../bundle/macos/rw.<anything>.dmg`.
const SCRATCH_IMAGE_PATTERN: &str = r"/bundle/macos/rw\.[^/]+\.dmg$";

/// Build output directory relative to the workspace root.
const TARGET_SUBDIR: &str = "src-tauri/target/";

fn scratch_image_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SCRATCH_IMAGE_PATTERN).expect("scratch image regex"))
}

/// The root spellings an image path is compared against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRoots {
    pub raw: String,
    pub canonical: String,
}

impl WorkspaceRoots {
    pub fn new(raw: impl Into<String>, canonical: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            canonical: canonical.into(),
        }
    }

    fn target_prefixes(&self) -> [String; 2] {
        [&self.raw, &self.canonical]
            .map(|root| format!("{}/{TARGET_SUBDIR}", root.trim_end_matches('/')))
    }
}

/// True when `path` sits under a root's build target and names a scratch image.
pub fn path_is_owned(path: &str, roots: &WorkspaceRoots) -> bool {
    scratch_image_regex().is_match(path)
        && roots
            .target_prefixes()
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
}

/// An image is owned if either its raw or canonical path is owned.
pub fn image_is_owned(raw_path: &str, canonical_path: &str, roots: &WorkspaceRoots) -> bool {
    path_is_owned(raw_path, roots) || path_is_owned(canonical_path, roots)
}
