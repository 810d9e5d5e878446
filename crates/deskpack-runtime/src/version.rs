//! Python version expectations
//!
//! Parses explicit `major.minor` overrides and reduces `requires-python`
//! specifiers to the tightest lower bound they imply.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A `major.minor` Python version.
///
/// Field order gives lexicographic integer ordering, so `3.9 < 3.10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
}

impl PythonVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        PythonVersion { major, minor }
    }

    /// Strictly parse `major.minor`; anything else (patch, suffixes, blanks) is rejected.
    pub fn parse_strict(raw: &str) -> Option<Self> {
        let (major, minor) = raw.trim().split_once('.')?;
        Some(PythonVersion {
            major: parse_component(major)?,
            minor: parse_component(minor)?,
        })
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Where a version expectation came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    /// An environment/flag override
    ExplicitOverride { key: String },
    /// `project.requires-python` in a manifest
    Manifest { path: PathBuf, specifier: String },
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::ExplicitOverride { key } => write!(f, "from {key}"),
            Provenance::Manifest { path, specifier } => {
                write!(f, "from requires-python {specifier:?} in {}", path.display())
            }
        }
    }
}

/// Resolved expectation for the embedded interpreter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionConstraint {
    pub version: PythonVersion,
    /// `true` = at least `version`, `false` = exactly `version`
    pub is_lower_bound: bool,
    pub provenance: Provenance,
}

impl VersionConstraint {
    pub fn exact(version: PythonVersion, provenance: Provenance) -> Self {
        VersionConstraint {
            version,
            is_lower_bound: false,
            provenance,
        }
    }

    pub fn at_least(version: PythonVersion, provenance: Provenance) -> Self {
        VersionConstraint {
            version,
            is_lower_bound: true,
            provenance,
        }
    }

    pub fn is_satisfied_by(&self, actual: PythonVersion) -> bool {
        if self.is_lower_bound {
            actual >= self.version
        } else {
            actual == self.version
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = if self.is_lower_bound { ">=" } else { "==" };
        write!(f, "{op}{} ({})", self.version, self.provenance)
    }
}

/// Reduce a comma-separated specifier to its tightest lower bound.
///
/// Clauses that are not lower bounds (`<4`, `!=3.12`) or that do not parse
/// are skipped. Returns `None` when no clause contributes a bound.
pub fn lower_bound_from_specifier(specifier: &str) -> Option<PythonVersion> {
    specifier.split(',').filter_map(clause_lower_bound).max()
}

/// Effective lower bound of one clause.
///
/// `>=X.Y`, `==X.Y` and `~=X.Y` bound at `X.Y`; `>X` bounds at `(X+1).0`
/// and `>X.Y` at `X.(Y+1)`. With a patch component (`>X.Y.Z`) the next
/// patch release still belongs to `X.Y`, so the bound stays `X.Y`.
pub fn clause_lower_bound(clause: &str) -> Option<PythonVersion> {
    let clause = clause.trim();
    let (op, rest) = ["~=", ">=", "==", ">"]
        .iter()
        .find_map(|op| clause.strip_prefix(op).map(|rest| (*op, rest)))?;
    if rest.starts_with('=') {
        // `===` arbitrary equality
        return None;
    }

    let mut parts = rest.trim().split('.');
    let major = parse_component(parts.next()?)?;
    let minor = match parts.next() {
        None => None,
        Some("*") => None,
        Some(raw) => Some(parse_component(raw)?),
    };
    let has_patch = parts.next().is_some();

    match (op, minor) {
        (">", None) => Some(PythonVersion::new(major.checked_add(1)?, 0)),
        (">", Some(minor)) if !has_patch => Some(PythonVersion::new(major, minor.checked_add(1)?)),
        (_, minor) => Some(PythonVersion::new(major, minor.unwrap_or(0))),
    }
}

fn parse_component(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u32, minor: u32) -> PythonVersion {
        PythonVersion::new(major, minor)
    }

    #[test]
    fn test_parse_strict_accepts_major_minor() {
        assert_eq!(PythonVersion::parse_strict("3.12"), Some(v(3, 12)));
        assert_eq!(PythonVersion::parse_strict(" 3.9 "), Some(v(3, 9)));
    }

    #[test]
    fn test_parse_strict_rejects_other_shapes() {
        for raw in ["3", "3.12.1", "3.x", "", ".", "3.", ".12", "v3.12", "-3.1", "3.+1"] {
            assert_eq!(PythonVersion::parse_strict(raw), None, "{raw:?} should be rejected");
        }
    }

    #[test]
    fn test_ordering_is_numeric_not_lexical() {
        assert!(v(3, 9) < v(3, 10));
        assert!(v(3, 12) > v(3, 11));
        assert!(v(4, 0) > v(3, 99));
    }

    #[test]
    fn test_clause_bounds() {
        assert_eq!(clause_lower_bound(">=3.10"), Some(v(3, 10)));
        assert_eq!(clause_lower_bound(" >= 3.10 "), Some(v(3, 10)));
        assert_eq!(clause_lower_bound("==3.11"), Some(v(3, 11)));
        assert_eq!(clause_lower_bound("==3.11.*"), Some(v(3, 11)));
        assert_eq!(clause_lower_bound("~=3.9"), Some(v(3, 9)));
        assert_eq!(clause_lower_bound(">3.9"), Some(v(3, 10)));
        assert_eq!(clause_lower_bound(">3"), Some(v(4, 0)));
        assert_eq!(clause_lower_bound(">=3"), Some(v(3, 0)));
        assert_eq!(clause_lower_bound(">=3.10.2"), Some(v(3, 10)));
        assert_eq!(clause_lower_bound(">3.9.5"), Some(v(3, 9)));
    }

    #[test]
    fn test_non_lower_bound_clauses_are_ignored() {
        for clause in ["<4", "<=3.12", "!=3.12", "===3.11", "", "foo", ">=three.ten"] {
            assert_eq!(clause_lower_bound(clause), None, "{clause:?}");
        }
    }

    #[test]
    fn test_specifier_takes_tightest_bound() {
        assert_eq!(lower_bound_from_specifier(">=3.9,>=3.11"), Some(v(3, 11)));
        assert_eq!(lower_bound_from_specifier(">3.9"), Some(v(3, 10)));
        assert_eq!(lower_bound_from_specifier(">=3.10,<4,==3.11"), Some(v(3, 11)));
        assert_eq!(lower_bound_from_specifier("~=3.10, >3.10"), Some(v(3, 11)));
    }

    #[test]
    fn test_specifier_permissive_on_garbage() {
        // A malformed clause silently drops out; the rest still bound.
        assert_eq!(lower_bound_from_specifier(">=3.9,foo"), Some(v(3, 9)));
        assert_eq!(lower_bound_from_specifier("foo,<4"), None);
        assert_eq!(lower_bound_from_specifier(""), None);
    }

    #[test]
    fn test_constraint_satisfaction() {
        let provenance = Provenance::ExplicitOverride {
            key: "DESKPACK_PYTHON_VERSION".to_string(),
        };
        let lower = VersionConstraint::at_least(v(3, 11), provenance.clone());
        assert!(!lower.is_satisfied_by(v(3, 10)));
        assert!(lower.is_satisfied_by(v(3, 11)));
        assert!(lower.is_satisfied_by(v(3, 12)));

        let exact = VersionConstraint::exact(v(3, 11), provenance);
        assert!(exact.is_satisfied_by(v(3, 11)));
        assert!(!exact.is_satisfied_by(v(3, 12)));
    }

    #[test]
    fn test_constraint_display_includes_provenance() {
        let constraint = VersionConstraint::at_least(
            v(3, 10),
            Provenance::Manifest {
                path: PathBuf::from("/src/pyproject.toml"),
                specifier: ">=3.10".to_string(),
            },
        );
        let text = constraint.to_string();
        assert!(text.starts_with(">=3.10"));
        assert!(text.contains("/src/pyproject.toml"));
    }
}
