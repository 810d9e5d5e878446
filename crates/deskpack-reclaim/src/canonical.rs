//! Memoized path canonicalization.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::HostError;
use crate::host::SystemHost;

/// Caches resolved paths for the lifetime of one reclaim run.
///
/// Each raw path is resolved at most once. When the resolver tool is
/// missing, raw paths are used as-is and a single warning is logged.
#[derive(Debug, Default)]
pub struct PathCanonicalizer {
    cache: RefCell<HashMap<String, String>>,
    warned_unavailable: Cell<bool>,
}

impl PathCanonicalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn canonicalize(&self, host: &dyn SystemHost, raw: &str) -> String {
        if let Some(hit) = self.cache.borrow().get(raw) {
            return hit.clone();
        }

        let resolved = match host.resolve_path(raw) {
            Ok(Some(path)) => path,
            Ok(None) => raw.to_string(),
            Err(HostError::ToolUnavailable { tool }) => {
                if !self.warned_unavailable.replace(true) {
                    warn!(
                        event = "reclaim.canonicalize_unavailable",
                        tool = %tool,
                        "path resolver unavailable; comparing raw paths only"
                    );
                }
                raw.to_string()
            }
            Err(e) => {
                debug!(event = "reclaim.canonicalize_failed", path = raw, error = %e);
                raw.to_string()
            }
        };

        self.cache
            .borrow_mut()
            .insert(raw.to_string(), resolved.clone());
        resolved
    }

    /// Number of distinct raw paths seen.
    pub fn cached(&self) -> usize {
        self.cache.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeHost;

    #[test]
    fn test_resolves_once_per_path() {
        let host = FakeHost::new().with_resolution("/var/ws", "/private/var/ws");
        let canon = PathCanonicalizer::new();

        assert_eq!(canon.canonicalize(&host, "/var/ws"), "/private/var/ws");
        assert_eq!(canon.canonicalize(&host, "/var/ws"), "/private/var/ws");
        assert_eq!(canon.canonicalize(&host, "/other"), "/other");
        assert_eq!(host.resolve_calls(), 2);
        assert_eq!(canon.cached(), 2);
    }

    #[test]
    fn test_unavailable_resolver_falls_back_to_raw() {
        let host = FakeHost::new().without_resolver();
        let canon = PathCanonicalizer::new();

        assert_eq!(canon.canonicalize(&host, "/a"), "/a");
        assert_eq!(canon.canonicalize(&host, "/b"), "/b");
        assert!(canon.warned_unavailable.get());
    }
}
