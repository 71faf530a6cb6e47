//! Compiled schema validator and violation model

use jsonschema::Draft;
use jsonschema::error::ValidationErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, trace};

/// Which side of a transform a document belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationContext {
    Input,
    Output,
}

impl fmt::Display for ValidationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationContext::Input => write!(f, "input"),
            ValidationContext::Output => write!(f, "output"),
        }
    }
}

/// A single schema violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// JSON pointer to the offending value (or to the missing property)
    pub path: String,
    /// Human readable message
    pub message: String,
    /// Failing keyword parameters
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Violation {
    /// Keyword that failed (`required`, `type`, `format`, ...)
    #[must_use]
    pub fn keyword(&self) -> Option<&str> {
        self.params.get("keyword").and_then(Value::as_str)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{path}: {}", self.message)
    }
}

/// Document failed schema validation
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{context} validation failed with {} violation(s)", .violations.len())]
pub struct ValidationError {
    pub context: ValidationContext,
    pub violations: Vec<Violation>,
}

/// A schema compiled once and reusable across many documents
pub struct SchemaValidator {
    validator: jsonschema::Validator,
}

impl SchemaValidator {
    /// Validate a document, collecting every violation
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] tagged with `context` when the document
    /// does not conform.
    pub fn validate(&self, data: &Value, context: ValidationContext) -> Result<(), ValidationError> {
        let violations = self.violations(data);
        if violations.is_empty() {
            trace!("{} document passed validation", context);
            return Ok(());
        }

        debug!(
            "{} document failed validation with {} violation(s)",
            context,
            violations.len()
        );
        Err(ValidationError {
            context,
            violations,
        })
    }

    /// Check validity without building violation details
    #[must_use]
    pub fn is_valid(&self, data: &Value) -> bool {
        self.validator.is_valid(data)
    }

    /// Every violation found in `data`, in validator order
    #[must_use]
    pub fn violations(&self, data: &Value) -> Vec<Violation> {
        self.validator
            .iter_errors(data)
            .map(|error| {
                let instance_path = error.instance_path.to_string();
                let schema_path = error.schema_path.to_string();
                let keyword = last_pointer_segment(&schema_path);

                let mut params = Map::new();
                params.insert("keyword".to_string(), Value::String(keyword));
                params.insert("schemaPath".to_string(), Value::String(schema_path));

                let path = match &error.kind {
                    ValidationErrorKind::Required { property } => {
                        let name = property
                            .as_str()
                            .map_or_else(|| property.to_string(), str::to_string);
                        params.insert("missingProperty".to_string(), Value::String(name.clone()));
                        format!("{instance_path}/{}", escape_pointer(&name))
                    }
                    _ => instance_path,
                };

                Violation {
                    path,
                    message: error.to_string(),
                    params,
                }
            })
            .collect()
    }
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator").finish_non_exhaustive()
    }
}

/// Compile a schema into a reusable validator (draft 7, formats asserted)
///
/// # Errors
///
/// Returns [`crate::Error::Schema`] when the schema is not a valid JSON Schema.
pub fn create_validator(schema: &Value) -> crate::Result<SchemaValidator> {
    let id = schema
        .get("$id")
        .and_then(Value::as_str)
        .unwrap_or("<inline>")
        .to_string();

    let validator = jsonschema::options()
        .with_draft(Draft::Draft7)
        .should_validate_formats(true)
        .build(schema)
        .map_err(|e| crate::Error::Schema {
            id,
            message: e.to_string(),
        })?;

    Ok(SchemaValidator { validator })
}

fn last_pointer_segment(pointer: &str) -> String {
    pointer
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .replace("~1", "/")
        .replace("~0", "~")
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}
