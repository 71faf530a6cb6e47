//! Schema model definitions

use crate::{Error, Result};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Directory under the registry root that holds schema documents
pub const SCHEMAS_DIR: &str = "schemas";

/// Parsed schema identifier (`scheme:vendor/name/format/version`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaRef {
    pub scheme: String,
    pub vendor: String,
    pub name: String,
    pub format: String,
    pub version: String,
}

impl SchemaRef {
    /// Parse a schema URI.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] when the scheme prefix is missing or the
    /// remainder does not have exactly four non-empty segments.
    pub fn parse(uri: &str) -> Result<Self> {
        let (scheme, rest) = uri
            .split_once(':')
            .ok_or_else(|| Error::parse(format!("schema URI '{uri}' is missing a scheme prefix")))?;

        if scheme.is_empty() {
            return Err(Error::parse(format!("schema URI '{uri}' has an empty scheme")));
        }

        let segments: Vec<&str> = rest.split('/').collect();
        if segments.len() != 4 {
            return Err(Error::parse(format!(
                "schema URI '{uri}' must have exactly four segments (vendor/name/format/version), found {}",
                segments.len()
            )));
        }

        for segment in &segments {
            if segment.is_empty() || *segment == "." || *segment == ".." || segment.contains('\\') {
                return Err(Error::parse(format!(
                    "schema URI '{uri}' contains an invalid segment '{segment}'"
                )));
            }
        }

        Ok(Self {
            scheme: scheme.to_string(),
            vendor: segments[0].to_string(),
            name: segments[1].to_string(),
            format: segments[2].to_string(),
            version: segments[3].to_string(),
        })
    }

    /// Path of the schema document relative to the registry root
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(SCHEMAS_DIR)
            .join(&self.vendor)
            .join(&self.name)
            .join(&self.format)
            .join(format!("{}.json", self.version))
    }
}

impl fmt::Display for SchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}/{}/{}",
            self.scheme, self.vendor, self.name, self.format, self.version
        )
    }
}

impl FromStr for SchemaRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A loaded JSON Schema document together with where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDocument {
    /// URI or file path the document was loaded from
    pub id: String,
    /// Raw schema content
    pub content: Value,
}

impl SchemaDocument {
    pub fn new(id: impl Into<String>, content: Value) -> Self {
        Self {
            id: id.into(),
            content,
        }
    }

    /// Top-level `properties` object, if any
    #[must_use]
    pub fn properties(&self) -> Option<&serde_json::Map<String, Value>> {
        self.content.get("properties").and_then(Value::as_object)
    }

    /// Top-level `required` field names
    #[must_use]
    pub fn required(&self) -> Vec<&str> {
        self.content
            .get("required")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}
