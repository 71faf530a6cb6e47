//! Integration test: schema evolution end to end
//!
//! Diff two schema versions, then patch a transform body for the result.

use canon_evolution::{
    DiffKind, DiffOptions, PatchOutcome, VersionBump, bump_minor, diff_schemas, diff_values,
    PatchOptions, SchemaSide, parse_diff, patch_transform, patch_transform_with,
};
use canon_schema::SchemaDocument;
use serde_json::{Value, json};

const CONTACT_BODY: &str = r#"{
  "displayName": firstname,
  "firstname": firstname,
  "age": age
}
"#;

fn contact_schema(properties: Value) -> SchemaDocument {
    SchemaDocument::new(
        "iglu:org.canonical/contact/jsonschema/1-0-0",
        json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": properties,
            "required": ["firstname"]
        }),
    )
}

#[test]
fn test_optional_field_added_patch_succeeds() {
    let from = contact_schema(json!({
        "firstname": {"type": "string"},
        "age": {"type": "integer"}
    }));
    let to = contact_schema(json!({
        "firstname": {"type": "string"},
        "age": {"type": "integer"},
        "phone": {"type": "string"}
    }));

    let diff = diff_schemas(&from, &to);
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].kind, DiffKind::Add);
    assert_eq!(diff[0].to_path.as_deref(), Some("phone"));

    match patch_transform(CONTACT_BODY, &diff) {
        PatchOutcome::Patched {
            patched,
            version_bump,
            ..
        } => {
            assert_eq!(version_bump, VersionBump::Minor);
            assert!(patched.contains("\"age\": age,\n  \"phone\": phone\n}"));
        }
        PatchOutcome::Refused { reasons, .. } => panic!("unexpected refusal: {reasons:?}"),
    }
    assert_eq!(bump_minor("1-0-0").unwrap(), "1-1-0");
}

#[test]
fn test_rename_patch_rewrites_tokens() {
    let from = json!({"type": "object", "properties": {
        "firstname": {"type": "string"},
        "age": {"type": "integer"}
    }});
    let to = json!({"type": "object", "properties": {
        "first_name": {"type": "string"},
        "age": {"type": "integer"}
    }});

    let diff = diff_values(&from, &to, &DiffOptions::default());
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].kind, DiffKind::Rename);

    // input schema renamed: references follow, output keys stay
    let outcome = patch_transform(CONTACT_BODY, &diff);
    assert!(outcome.is_patched());
    let patched = outcome.source_text();
    assert!(patched.contains("\"displayName\": first_name"));
    assert!(patched.contains("\"firstname\": first_name"));

    // output schema renamed: the key follows, references stay
    let options = PatchOptions {
        side: SchemaSide::Target,
    };
    let outcome = patch_transform_with(CONTACT_BODY, &diff, &options);
    assert!(outcome.is_patched());
    let patched = outcome.source_text();
    assert!(patched.contains("\"displayName\": firstname"));
    assert!(patched.contains("\"first_name\": firstname"));
}

#[test]
fn test_type_change_patch_refused() {
    let from = json!({"type": "object", "properties": {"age": {"type": "integer"}}});
    let to = json!({"type": "object", "properties": {"age": {"type": "string"}}});

    let diff = diff_values(&from, &to, &DiffOptions::default());
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].kind, DiffKind::TypeChange);

    match patch_transform(CONTACT_BODY, &diff) {
        PatchOutcome::Refused {
            source,
            blockers,
            reasons,
        } => {
            assert_eq!(source.as_bytes(), CONTACT_BODY.as_bytes());
            assert_eq!(blockers, diff);
            assert!(!reasons.is_empty());
        }
        PatchOutcome::Patched { .. } => panic!("type changes must not be patched"),
    }
}

#[test]
fn test_diff_is_independent_of_property_order() {
    let a = json!({"type": "object", "properties": {
        "zeta": {"type": "string"},
        "alpha": {"type": "object", "properties": {
            "y": {"type": "integer"},
            "x": {"type": "string"}
        }},
        "name": {"type": "string"}
    }, "required": ["name", "zeta"]});
    let a_reordered = json!({"required": ["zeta", "name"], "properties": {
        "name": {"type": "string"},
        "alpha": {"properties": {
            "x": {"type": "string"},
            "y": {"type": "integer"}
        }, "type": "object"},
        "zeta": {"type": "string"}
    }, "type": "object"});
    let b = json!({"type": "object", "properties": {
        "full_name": {"type": "string"},
        "alpha": {"type": "object", "properties": {
            "x": {"type": "integer"},
            "w": {"type": "string"}
        }},
        "zeta": {"type": "number"}
    }, "required": ["zeta"]});

    let options = DiffOptions::default();
    let first = diff_values(&a, &b, &options);
    let second = diff_values(&a_reordered, &b, &options);
    assert_eq!(first, second);
    assert!(!first.is_empty());

    let kinds: Vec<(String, DiffKind)> = first
        .iter()
        .map(|e| (e.path().to_string(), e.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("alpha.w".to_string(), DiffKind::Add),
            ("alpha.x".to_string(), DiffKind::TypeChange),
            ("alpha.y".to_string(), DiffKind::Remove),
            ("full_name".to_string(), DiffKind::Add),
            ("name".to_string(), DiffKind::Remove),
            ("zeta".to_string(), DiffKind::TypeChange),
        ]
    );
}

#[test]
fn test_diff_json_round_trips_into_patcher() {
    let from = json!({"type": "object", "properties": {"name": {"type": "string"}}});
    let to = json!({"type": "object", "properties": {
        "name": {"type": "string"},
        "email": {"type": "string", "format": "email"}
    }});
    let diff = diff_values(&from, &to, &DiffOptions::default());
    let serialized = serde_json::to_string_pretty(&diff).unwrap();
    let parsed = parse_diff(&serialized).unwrap();
    assert_eq!(parsed, diff);

    let outcome = patch_transform(r#"{ "name": name }"#, &parsed);
    assert_eq!(outcome.source_text(), r#"{ "name": name, "email": email }"#);
}
