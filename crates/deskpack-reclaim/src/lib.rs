//! deskpack reclaim - stale disk image cleanup for macOS bundling
//!
//! Interrupted bundler runs leave scratch images attached and their helper
//! processes alive, which breaks the next build on the same runner. The
//! [`Reclaimer`] detaches and stops only what belongs to the current
//! workspace, and never fails its caller.

pub mod canonical;
pub mod config;
pub mod error;
pub mod fakes;
pub mod host;
pub mod inventory;
pub mod ownership;
pub mod reclaimer;

// Re-export key types
pub use canonical::PathCanonicalizer;
pub use config::{is_truthy, RawReclaimConfig, ReclaimConfig};
pub use error::{HostError, HostResult};
pub use host::{MacHost, SystemHost};
pub use inventory::{DiskImageRecord, MountRecord};
pub use ownership::{image_is_owned, WorkspaceRoots};
pub use reclaimer::{ReclaimReport, Reclaimer};
