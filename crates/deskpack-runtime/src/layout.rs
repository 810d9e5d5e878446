//! Runtime directory layout
//!
//! A standalone distribution exposes its interpreter at a conventional
//! relative path; these helpers find it.

use crate::error::RuntimeError;
use crate::Result;
use std::path::{Path, PathBuf};

/// Relative interpreter locations, most specific first.
pub fn interpreter_candidates() -> &'static [&'static str] {
    if cfg!(windows) {
        &["python.exe", "Scripts/python.exe"]
    } else {
        &["bin/python3", "bin/python"]
    }
}

/// Locate the interpreter executable inside `runtime_root`.
pub fn locate_interpreter(runtime_root: &Path) -> Result<PathBuf> {
    interpreter_candidates()
        .iter()
        .map(|relative| runtime_root.join(relative))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| RuntimeError::InterpreterNotFound {
            runtime: runtime_root.to_path_buf(),
        })
}
