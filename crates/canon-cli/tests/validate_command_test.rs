mod common;

use common::{assert_failed_quietly, canon, registry_root, run_with_stdin, stdout_json};
use serde_json::json;
use std::fs;

const CONTACT_SCHEMA: &str = "iglu:com.example/contact/jsonschema/1-0-0";

#[test]
fn validate_accepts_conforming_document() {
    let mut command = canon(&registry_root());
    command.args(["validate", "--schema", CONTACT_SCHEMA]);
    let output = run_with_stdin(command, r#"{"name": "John"}"#);

    assert_eq!(
        stdout_json(&output),
        json!({"valid": true, "schema": CONTACT_SCHEMA})
    );
}

#[test]
fn validate_reports_missing_required_property() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("invalid.json");
    fs::write(&data, r#"{"invalid": "x"}"#).unwrap();

    let output = canon(&registry_root())
        .args(["validate", "--schema", CONTACT_SCHEMA, "--data"])
        .arg(&data)
        .output()
        .expect("run canon validate");

    let stderr = assert_failed_quietly(&output);
    assert!(stderr.contains("1 violation(s)"), "stderr: {stderr}");
    assert!(stderr.contains("/name:"), "stderr: {stderr}");
}

#[test]
fn validate_accepts_schema_file_path() {
    let dir = tempfile::tempdir().unwrap();
    let schema = dir.path().join("age.json");
    fs::write(
        &schema,
        r#"{"type": "object", "properties": {"age": {"type": "integer", "minimum": 0}}}"#,
    )
    .unwrap();

    let mut command = canon(&registry_root());
    command.arg("validate").arg("--schema").arg(&schema);
    let output = run_with_stdin(command, r#"{"age": -1}"#);

    let stderr = assert_failed_quietly(&output);
    assert!(stderr.contains("/age"), "stderr: {stderr}");
}

#[test]
fn validate_unknown_schema_is_an_error() {
    let mut command = canon(&registry_root());
    command.args(["validate", "--schema", "iglu:com.example/missing/jsonschema/1-0-0"]);
    let output = run_with_stdin(command, "{}");

    let stderr = assert_failed_quietly(&output);
    assert!(stderr.contains("Schema not found"), "stderr: {stderr}");
}
