//! Integration test: validating realistic documents across threads

use canon_validation::{ValidationContext, ValidatorCache, create_validator};
use serde_json::json;
use std::sync::Arc;
use std::thread;

fn email_schema() -> serde_json::Value {
    json!({
        "$id": "iglu:org.canonical/email/jsonschema/1-0-0",
        "type": "object",
        "properties": {
            "id": {"type": "string"},
            "subject": {"type": "string"},
            "from": {
                "type": "object",
                "properties": {
                    "email": {"type": "string", "format": "email"},
                    "name": {"type": "string"}
                },
                "required": ["email"]
            },
            "receivedAt": {"type": "string", "format": "date-time"},
            "size": {"type": "integer", "minimum": 0}
        },
        "required": ["id", "from"]
    })
}

#[test]
fn test_valid_email_document() {
    let validator = create_validator(&email_schema()).unwrap();
    let doc = json!({
        "id": "msg-1",
        "subject": "Hi",
        "from": {"email": "ann@example.com", "name": "Ann"},
        "receivedAt": "2024-01-15T10:30:00Z",
        "size": 2048
    });
    assert!(validator.validate(&doc, ValidationContext::Output).is_ok());
}

#[test]
fn test_every_violation_is_reported() {
    let validator = create_validator(&email_schema()).unwrap();
    let doc = json!({
        "from": {"name": "Ann"},
        "receivedAt": "yesterday",
        "size": "big"
    });

    let err = validator.validate(&doc, ValidationContext::Input).unwrap_err();
    let mut paths: Vec<String> = err.violations.iter().map(|v| v.path.clone()).collect();
    paths.sort();

    assert_eq!(paths, vec!["/from/email", "/id", "/receivedAt", "/size"]);
    for violation in &err.violations {
        assert!(!violation.message.is_empty());
        assert!(violation.keyword().is_some());
    }
}

#[test]
fn test_validation_error_serializes_for_reports() {
    let validator = create_validator(&json!({"type": "object", "required": ["name"]})).unwrap();
    let err = validator
        .validate(&json!({"invalid": "x"}), ValidationContext::Input)
        .unwrap_err();

    let report = serde_json::to_value(&err).unwrap();
    assert_eq!(report["context"], "input");
    assert_eq!(report["violations"][0]["path"], "/name");
}

#[test]
fn test_shared_cache_across_threads() {
    let cache = Arc::new(ValidatorCache::new());
    let schema = Arc::new(email_schema());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let cache = Arc::clone(&cache);
            let schema = Arc::clone(&schema);
            thread::spawn(move || {
                let validator = cache
                    .get_or_compile("iglu:org.canonical/email/jsonschema/1-0-0", &schema)
                    .unwrap();
                let doc = json!({"id": format!("msg-{i}"), "from": {"email": "a@b.io"}});
                validator.validate(&doc, ValidationContext::Input).is_ok()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(cache.len(), 1);
}
