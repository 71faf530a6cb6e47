//! Transform metadata sidecar (`spec.meta.yaml`)

use crate::{Error, Result};
use canon_mapping::ExtensionRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// File name of the sidecar inside a transform version directory
pub const META_FILE_NAME: &str = "spec.meta.yaml";

/// Body file used when the sidecar does not name one
pub const DEFAULT_SPEC_PATH: &str = "spec.jsonata";

/// Sidecar contents as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformMeta {
    /// Transform identifier, `{domain}/{name}`
    pub id: String,

    /// Transform version
    pub version: String,

    /// Input schema URI
    pub from_schema: String,

    /// Output schema URI
    pub to_schema: String,

    /// Body file relative to the sidecar
    #[serde(default = "default_spec_path")]
    pub spec_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Checksum>,

    /// Extension functions to bind before evaluation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<ExtensionRef>,

    #[serde(default)]
    pub engine: Engine,

    #[serde(default)]
    pub status: TransformStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,

    /// Golden fixtures, paths relative to the sidecar
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<TestFixture>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compat: Option<Compat>,
}

fn default_spec_path() -> String {
    DEFAULT_SPEC_PATH.to_string()
}

/// Integrity record for the body file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    /// Lowercase hex SHA-256 of the body file bytes
    pub jsonata_sha256: String,
}

/// Expression engine a body is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Jsonata,
}

/// Lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformStatus {
    #[default]
    Draft,
    Stable,
    Deprecated,
}

impl fmt::Display for TransformStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformStatus::Draft => write!(f, "draft"),
            TransformStatus::Stable => write!(f, "stable"),
            TransformStatus::Deprecated => write!(f, "deprecated"),
        }
    }
}

/// Authorship record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub author: String,
    pub created_utc: DateTime<Utc>,
}

/// Golden fixture: an input document and the output it must produce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFixture {
    pub input: String,
    pub expect: String,
}

/// Input schema versions a transform accepts, e.g. `1-0-0 .. 1-2-x`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Compat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_schema_range: Option<String>,
}

impl TransformMeta {
    /// Parse sidecar YAML
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for malformed YAML, missing required keys
    /// (`id`, `version`, `from_schema`, `to_schema`), empty values, or a
    /// checksum that is not 64 hex digits.
    pub fn parse(yaml: &str) -> Result<Self> {
        let meta: Self = serde_yaml::from_str(yaml).map_err(|e| {
            let location = e
                .location()
                .map(|l| format!(" at line {}, column {}", l.line(), l.column()))
                .unwrap_or_default();
            Error::parse(format!("invalid transform metadata{location}: {e}"))
        })?;
        meta.check()?;
        Ok(meta)
    }

    /// Serialize back to YAML
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] when serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::parse(format!("failed to serialize metadata: {e}")))
    }

    /// Recorded body checksum, if any
    #[must_use]
    pub fn recorded_checksum(&self) -> Option<&str> {
        self.checksum.as_ref().map(|c| c.jsonata_sha256.as_str())
    }

    fn check(&self) -> Result<()> {
        for (key, value) in [
            ("id", &self.id),
            ("version", &self.version),
            ("from_schema", &self.from_schema),
            ("to_schema", &self.to_schema),
            ("spec_path", &self.spec_path),
        ] {
            if value.trim().is_empty() {
                return Err(Error::parse(format!("transform metadata key '{key}' is empty")));
            }
        }

        if let Some(checksum) = self.recorded_checksum() {
            let well_formed = checksum.len() == 64 && checksum.chars().all(|c| c.is_ascii_hexdigit());
            if !well_formed {
                return Err(Error::parse(format!(
                    "checksum.jsonata_sha256 '{checksum}' is not a hex SHA-256 digest"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_META: &str = r#"
id: email/gmail_to_canonical
version: 1-0-0
engine: jsonata
from_schema: iglu:com.google/gmail_email/jsonschema/1-0-0
to_schema: iglu:org.canonical/email/jsonschema/1-0-0
spec_path: gmail.jsonata
checksum:
  jsonata_sha256: 2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae
extensions:
  - name: htmlToMarkdown
    impl: html.to_markdown@1.0.0
tests:
  - input: tests/input.json
    expect: tests/expect.json
compat:
  from_schema_range: 1-0-0 .. 1-2-x
provenance:
  author: Ada Lovelace <ada@example.org>
  created_utc: 2025-11-12T09:30:00Z
status: stable
"#;

    #[test]
    fn test_parse_full_sidecar() {
        let meta = TransformMeta::parse(FULL_META).unwrap();
        assert_eq!(meta.id, "email/gmail_to_canonical");
        assert_eq!(meta.spec_path, "gmail.jsonata");
        assert_eq!(meta.status, TransformStatus::Stable);
        assert_eq!(meta.engine, Engine::Jsonata);
        assert_eq!(meta.extensions, vec![ExtensionRef::new("htmlToMarkdown", "html.to_markdown@1.0.0")]);
        assert_eq!(meta.tests.len(), 1);
        assert_eq!(
            meta.compat.unwrap().from_schema_range.as_deref(),
            Some("1-0-0 .. 1-2-x")
        );
        let provenance = meta.provenance.unwrap();
        assert_eq!(provenance.created_utc.to_rfc3339(), "2025-11-12T09:30:00+00:00");
    }

    #[test]
    fn test_defaults_for_optional_keys() {
        let meta = TransformMeta::parse(
            "id: a/b\nversion: 1-0-0\nfrom_schema: iglu:a/b/jsonschema/1-0-0\nto_schema: iglu:a/c/jsonschema/1-0-0\n",
        )
        .unwrap();
        assert_eq!(meta.spec_path, DEFAULT_SPEC_PATH);
        assert_eq!(meta.status, TransformStatus::Draft);
        assert!(meta.checksum.is_none());
        assert!(meta.extensions.is_empty());
        assert!(meta.recorded_checksum().is_none());
    }

    #[test]
    fn test_missing_required_key_is_parse_error() {
        let err = TransformMeta::parse("id: a/b\nversion: 1-0-0\nfrom_schema: iglu:a/b/jsonschema/1-0-0\n")
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert!(err.to_string().contains("to_schema"));
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        let err = TransformMeta::parse("id: [unclosed").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_rejects_malformed_checksum() {
        let yaml = "id: a/b\nversion: 1-0-0\nfrom_schema: x:a/b/c/d\nto_schema: x:a/b/c/e\nchecksum:\n  jsonata_sha256: ABC\n";
        let err = TransformMeta::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("jsonata_sha256"));
    }

    #[test]
    fn test_accepts_uppercase_checksum() {
        let digest = "2C26B46B68FFC68FF99B453C1D30413413422D706483BFA0F98A5E886266E7AE";
        let yaml = format!(
            "id: a/b\nversion: 1-0-0\nfrom_schema: x:a/b/c/d\nto_schema: x:a/b/c/e\nchecksum:\n  jsonata_sha256: {digest}\n"
        );
        let meta = TransformMeta::parse(&yaml).unwrap();
        assert_eq!(meta.recorded_checksum(), Some(digest));
    }

    #[test]
    fn test_unknown_engine_is_rejected() {
        let yaml = "id: a/b\nversion: 1-0-0\nfrom_schema: x:a/b/c/d\nto_schema: x:a/b/c/e\nengine: xslt\n";
        assert!(TransformMeta::parse(yaml).is_err());
    }

    #[test]
    fn test_yaml_round_trip_keeps_impl_key() {
        let meta = TransformMeta::parse(FULL_META).unwrap();
        let yaml = meta.to_yaml().unwrap();
        assert!(yaml.contains("impl: html.to_markdown@1.0.0"));
        assert_eq!(TransformMeta::parse(&yaml).unwrap(), meta);
    }
}
