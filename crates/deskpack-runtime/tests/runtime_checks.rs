//! End-to-end tests for runtime source validation and version resolution.

use std::path::Path;

use deskpack_runtime::fakes::FakeProber;
use deskpack_runtime::{
    resolve_expected_version, validate_runtime_source, validate_runtime_version,
    ManifestReading, ProbeError, ProbeOptions, PythonVersion, RuntimeError, VENV_MARKER,
};
use tempfile::tempdir;

fn write_manifest(dir: &Path, body: &str) {
    std::fs::write(dir.join("pyproject.toml"), body).unwrap();
}

// -------------------------------------------------------------------------
// Runtime source validation
// -------------------------------------------------------------------------

#[test]
fn test_runtime_inside_output_is_unsafe() {
    let project = tempdir().unwrap();
    let output = project.path().join("resources/backend");
    for nested in ["", "python", "python/lib"] {
        let runtime = output.join(nested);
        std::fs::create_dir_all(&runtime).unwrap();

        let err = validate_runtime_source(project.path(), &output, runtime.to_str()).unwrap_err();
        assert!(
            matches!(err, RuntimeError::UnsafeOverlap { .. }),
            "{nested:?}: {err}"
        );
    }
}

#[test]
fn test_relative_output_dir_is_taken_from_project_root() {
    let project = tempdir().unwrap();
    let runtime = project.path().join("resources/backend/python");
    std::fs::create_dir_all(&runtime).unwrap();

    // The process cwd is not the project root.
    let err = validate_runtime_source(
        project.path(),
        Path::new("resources/backend"),
        Some("resources/backend/python"),
    )
    .unwrap_err();
    match err {
        RuntimeError::UnsafeOverlap { output, .. } => {
            assert_eq!(output, project.path().join("resources/backend"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_output_inside_runtime_is_unsafe() {
    let project = tempdir().unwrap();
    let runtime_parent = tempdir().unwrap();
    let output = runtime_parent.path().join("out");

    let err = validate_runtime_source(project.path(), &output, runtime_parent.path().to_str())
        .unwrap_err();
    assert!(matches!(err, RuntimeError::UnsafeOverlap { .. }));
}

#[test]
fn test_project_root_or_ancestor_is_too_broad() {
    let outer = tempdir().unwrap();
    let project = outer.path().join("work/app");
    std::fs::create_dir_all(&project).unwrap();
    let output = project.join("resources/backend");

    for candidate in [project.clone(), outer.path().join("work"), outer.path().to_path_buf()] {
        let err = validate_runtime_source(&project, &output, candidate.to_str()).unwrap_err();
        assert!(
            matches!(err, RuntimeError::TooBroadSource { .. }),
            "{}: {err}",
            candidate.display()
        );
        assert!(err.is_configuration());
    }
}

#[test]
fn test_virtual_environment_is_rejected() {
    let project = tempdir().unwrap();
    let venv = tempdir().unwrap();
    std::fs::write(venv.path().join(VENV_MARKER), "home = /usr/bin\n").unwrap();

    let err = validate_runtime_source(
        project.path(),
        &project.path().join("out"),
        venv.path().to_str(),
    )
    .unwrap_err();
    assert!(matches!(err, RuntimeError::VirtualEnvironmentDetected { .. }));
}

#[test]
fn test_standalone_runtime_is_accepted() {
    let project = tempdir().unwrap();
    let runtime = tempdir().unwrap();
    std::fs::create_dir_all(runtime.path().join("bin")).unwrap();

    let source = validate_runtime_source(
        project.path(),
        &project.path().join("resources/backend"),
        runtime.path().to_str(),
    )
    .unwrap();
    assert_eq!(source.path, runtime.path().canonicalize().unwrap());
}

#[test]
fn test_sibling_with_shared_name_prefix_is_not_overlap() {
    let outer = tempdir().unwrap();
    let project = outer.path().join("app");
    let output = outer.path().join("out");
    let runtime = outer.path().join("output-python");
    std::fs::create_dir_all(&project).unwrap();
    std::fs::create_dir_all(&runtime).unwrap();

    assert!(validate_runtime_source(&project, &output, runtime.to_str()).is_ok());
}

// -------------------------------------------------------------------------
// Version resolution
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_explicit_override_wins_over_manifest() {
    let source = tempdir().unwrap();
    write_manifest(source.path(), "[project]\nrequires-python = \">=3.9\"\n");
    let prober = FakeProber::new().with_requires_python(">=3.9");

    let constraint = resolve_expected_version(source.path(), Some("3.12"), &prober)
        .await
        .unwrap();
    assert_eq!(constraint.version, PythonVersion::new(3, 12));
    assert!(!constraint.is_lower_bound);
    assert_eq!(prober.manifest_reads(), 0);
}

#[tokio::test]
async fn test_malformed_override_is_rejected() {
    let source = tempdir().unwrap();
    let prober = FakeProber::new();
    for raw in ["3", "3.12.1", "latest", "3.x"] {
        let err = resolve_expected_version(source.path(), Some(raw), &prober)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidVersionFormat { .. }), "{raw}");
    }
}

#[tokio::test]
async fn test_manifest_specifier_resolves_tightest_bound() {
    let source = tempdir().unwrap();
    write_manifest(source.path(), "[project]\n");
    let prober = FakeProber::new().with_requires_python(">=3.9,>=3.11");

    let constraint = resolve_expected_version(source.path(), None, &prober)
        .await
        .unwrap();
    assert_eq!(constraint.version, PythonVersion::new(3, 11));
    assert!(constraint.is_lower_bound);
}

#[tokio::test]
async fn test_exclusive_bound_moves_to_next_minor() {
    let source = tempdir().unwrap();
    write_manifest(source.path(), "[project]\n");
    let prober = FakeProber::new().with_requires_python(">3.9");

    let constraint = resolve_expected_version(source.path(), None, &prober)
        .await
        .unwrap();
    assert_eq!(constraint.version, PythonVersion::new(3, 10));
}

#[tokio::test]
async fn test_unparseable_clauses_alone_leave_constraint_unresolved() {
    let source = tempdir().unwrap();
    write_manifest(source.path(), "[project]\n");
    let prober = FakeProber::new().with_requires_python("<4, !=3.12");

    let err = resolve_expected_version(source.path(), None, &prober)
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::UnresolvedConstraint { .. }));
}

#[tokio::test]
async fn test_missing_manifest_is_unresolved() {
    let source = tempdir().unwrap();
    let prober = FakeProber::new().with_requires_python(">=3.10");

    let err = resolve_expected_version(source.path(), None, &prober)
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::UnresolvedConstraint { .. }));
    assert_eq!(prober.manifest_reads(), 0);
}

#[tokio::test]
async fn test_unavailable_helper_falls_through_to_unresolved() {
    let source = tempdir().unwrap();
    write_manifest(source.path(), "[project]\nrequires-python = \">=3.10\"\n");
    let prober = FakeProber::new().with_manifest(Err(ProbeError::HelperUnavailable {
        tried: "python3".to_string(),
    }));

    let err = resolve_expected_version(source.path(), None, &prober)
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::UnresolvedConstraint { .. }));
}

#[tokio::test]
async fn test_helper_structured_error_is_loud() {
    let source = tempdir().unwrap();
    write_manifest(source.path(), "[project\n");
    let prober = FakeProber::new().with_manifest(Ok(ManifestReading {
        requires_python: None,
        error: Some("parse_failed".to_string()),
        message: Some("Failed to parse pyproject.toml: bad header".to_string()),
    }));

    let err = resolve_expected_version(source.path(), None, &prober)
        .await
        .unwrap_err();
    match err {
        RuntimeError::ManifestReadFailed { code, message, .. } => {
            assert_eq!(code, "parse_failed");
            assert!(message.contains("bad header"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_absent_field_is_unresolved_not_failure() {
    let source = tempdir().unwrap();
    write_manifest(source.path(), "[project]\nname = \"backend\"\n");
    let prober = FakeProber::new().with_manifest(Ok(ManifestReading::default()));

    let err = resolve_expected_version(source.path(), None, &prober)
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::UnresolvedConstraint { .. }));
}

// -------------------------------------------------------------------------
// Runtime validation
// -------------------------------------------------------------------------

async fn lower_bound_3_11() -> deskpack_runtime::VersionConstraint {
    let source = tempdir().unwrap();
    write_manifest(source.path(), "[project]\n");
    let manifest_prober = FakeProber::new().with_requires_python(">=3.11");
    resolve_expected_version(source.path(), None, &manifest_prober)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_runtime_below_lower_bound_fails() {
    let prober = FakeProber::new().with_runtime_version("3.10");
    let constraint = lower_bound_3_11().await;

    let err = validate_runtime_version(
        Path::new("/rt/bin/python3"),
        &constraint,
        &ProbeOptions::default(),
        &prober,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RuntimeError::VersionTooLow { .. }));
    assert!(err.to_string().contains("requires-python"));
}

#[tokio::test]
async fn test_runtime_meeting_lower_bound_passes() {
    for actual in ["3.11", "3.12"] {
        let prober = FakeProber::new().with_runtime_version(actual);
        let constraint = lower_bound_3_11().await;
        let result = validate_runtime_version(
            Path::new("/rt/bin/python3"),
            &constraint,
            &ProbeOptions::default(),
            &prober,
        )
        .await
        .unwrap();
        assert_eq!(result.version.to_string(), actual);
    }
}

#[tokio::test]
async fn test_exact_override_mismatch() {
    let source = tempdir().unwrap();
    let prober = FakeProber::new().with_runtime_version("3.12");
    let constraint = resolve_expected_version(source.path(), Some("3.11"), &prober)
        .await
        .unwrap();

    let err = validate_runtime_version(
        Path::new("/rt/bin/python3"),
        &constraint,
        &ProbeOptions::default(),
        &prober,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RuntimeError::VersionMismatch { .. }));
}

#[tokio::test]
async fn test_probe_timeout_is_probe_failure() {
    let source = tempdir().unwrap();
    let prober = FakeProber::new().with_snippet(
        deskpack_runtime::prober::VERSION_SNIPPET,
        Err(ProbeError::Timeout(std::time::Duration::from_secs(15))),
    );
    let constraint = resolve_expected_version(source.path(), Some("3.11"), &prober)
        .await
        .unwrap();

    let err = validate_runtime_version(
        Path::new("/rt/bin/python3"),
        &constraint,
        &ProbeOptions::default(),
        &prober,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RuntimeError::ProbeFailed { label: "version", .. }));
    assert!(!err.is_compatibility());
}

#[tokio::test]
async fn test_pip_probe_only_when_opted_in() {
    let source = tempdir().unwrap();
    let prober = FakeProber::new()
        .with_runtime_version("3.12")
        .with_snippet("import pip", Err(ProbeError::Failed("No module named pip".to_string())));
    let constraint = resolve_expected_version(source.path(), Some("3.12"), &prober)
        .await
        .unwrap();

    let mut options = ProbeOptions::default();
    validate_runtime_version(Path::new("/rt/bin/python3"), &constraint, &options, &prober)
        .await
        .unwrap();

    options.require_pip = true;
    let err = validate_runtime_version(Path::new("/rt/bin/python3"), &constraint, &options, &prober)
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::ProbeFailed { label: "pip", .. }));
}
