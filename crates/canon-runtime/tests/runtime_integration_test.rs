//! Integration test: running transforms from a registry on disk
//!
//! Uses the shared registry under `testdata/registry`. Tests that modify
//! files work on a temporary copy.

use canon_runtime::{
    Error, FixtureStatus, RunOptions, TransformId, TransformRuntime, compute_checksum,
    discover_transforms, load_transform_spec, run_transform,
};
use canon_validation::ValidationContext;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

const CONTACT: &str = "contact/to_canonical@1-0-0";

fn registry_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("testdata")
        .join("registry")
}

fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), target).unwrap();
        }
    }
}

fn registry_copy() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    copy_dir(&registry_root(), dir.path());
    dir
}

#[test]
fn test_html_contact_transform() {
    let output = run_transform(
        CONTACT,
        &json!({"name": "John", "html": "<p>Hello <strong>world</strong></p>"}),
        &RunOptions::new(registry_root()),
    )
    .unwrap();
    assert_eq!(
        output,
        json!({"displayName": "John", "content": "Hello **world**"})
    );
}

#[test]
fn test_invalid_input_reports_missing_property() {
    let err = run_transform(
        CONTACT,
        &json!({"invalid": "x"}),
        &RunOptions::new(registry_root()),
    )
    .unwrap_err();

    match err {
        Error::Validation(err) => {
            assert_eq!(err.context, ValidationContext::Input);
            assert_eq!(err.violations.len(), 1);
            assert_eq!(err.violations[0].path, "/name");
        }
        other => panic!("expected input validation error, got {other:?}"),
    }
}

#[test]
fn test_unregistered_extension_names_symbol_and_impl() {
    let err = run_transform(
        "contact/with_unknown_extension@1-0-0",
        &json!({"name": "John"}),
        &RunOptions::new(registry_root()),
    )
    .unwrap_err();

    match err {
        Error::ExtensionNotFound { name, impl_key } => {
            assert_eq!(name, "foo");
            assert_eq!(impl_key, "foo.bar@9.9.9");
        }
        other => panic!("expected ExtensionNotFound, got {other:?}"),
    }
}

#[test]
fn test_runs_are_pure() {
    let runtime = TransformRuntime::default();
    let options = RunOptions::new(registry_root());
    let input = json!({"name": "Ada", "html": "<ul><li>one</li><li>two</li></ul>"});
    let snapshot = input.clone();

    let first = runtime.run_transform(CONTACT, &input, &options).unwrap();
    let second = runtime.run_transform(CONTACT, &input, &options).unwrap();
    assert_eq!(first, second);
    assert_eq!(input, snapshot);
}

#[test]
fn test_recorded_checksum_matches_body() {
    let spec = load_transform_spec(CONTACT, &registry_root()).unwrap();
    assert_eq!(
        spec.checksum.as_deref(),
        Some(compute_checksum(&spec.body_path).unwrap().as_str())
    );
}

#[test]
fn test_single_byte_edit_is_detected() {
    let registry = registry_copy();
    let body = registry
        .path()
        .join("transforms/contact/to_canonical/1-0-0/spec.jsonata");
    let mut bytes = fs::read(&body).unwrap();
    bytes.push(b' ');
    fs::write(&body, bytes).unwrap();

    let err = run_transform(
        CONTACT,
        &json!({"name": "John"}),
        &RunOptions::new(registry.path()),
    )
    .unwrap_err();
    match err {
        Error::ChecksumMismatch { expected, actual, .. } => assert_ne!(expected, actual),
        other => panic!("expected checksum mismatch, got {other:?}"),
    }
}

#[test]
fn test_edit_after_loading_is_detected() {
    let mut spec = load_transform_spec(CONTACT, &registry_root()).unwrap();
    spec.body = r#"{ "displayName": "TAMPERED", "content": "x" }"#.to_string();
    let runtime = TransformRuntime::default();
    let input = json!({"name": "John"});

    let err = runtime
        .run_spec(&spec, &input, &RunOptions::new(registry_root()))
        .unwrap_err();
    assert!(matches!(err, Error::ChecksumMismatch { .. }), "got {err:?}");

    let unchecked = RunOptions::new(registry_root()).with_checksum_verification(false);
    let output = runtime.run_spec(&spec, &input, &unchecked).unwrap();
    assert_eq!(output["displayName"], json!("TAMPERED"));
}

#[test]
fn test_uppercase_recorded_checksum_verifies() {
    let registry = registry_copy();
    let meta = registry
        .path()
        .join("transforms/contact/to_canonical/1-0-0/spec.meta.yaml");
    let spec = load_transform_spec(CONTACT, registry.path()).unwrap();
    let digest = spec.checksum.unwrap();
    let text = fs::read_to_string(&meta).unwrap();
    fs::write(&meta, text.replace(&digest, &digest.to_uppercase())).unwrap();

    let output = run_transform(
        CONTACT,
        &json!({"name": "John"}),
        &RunOptions::new(registry.path()),
    )
    .unwrap();
    assert_eq!(output["displayName"], json!("John"));
}

#[test]
fn test_golden_fixtures_pass() {
    let spec = load_transform_spec(CONTACT, &registry_root()).unwrap();
    let reports = TransformRuntime::default()
        .check_fixtures(&spec, &RunOptions::new(registry_root()))
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, FixtureStatus::Passed);
}

#[test]
fn test_discover_registry_transforms() {
    let root = registry_root();
    let ids: Vec<String> = discover_transforms(&root)
        .unwrap()
        .iter()
        .filter_map(|path| TransformId::from_meta_path(&root, path))
        .map(|id| id.to_string())
        .collect();
    assert_eq!(
        ids,
        vec![
            "contact/to_canonical@1-0-0",
            "contact/with_unknown_extension@1-0-0"
        ]
    );
}
