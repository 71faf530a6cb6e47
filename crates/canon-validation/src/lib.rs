#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

//! # canon-validation
//!
//! JSON Schema validation adapter for transform inputs and outputs.
//!
//! Unlike a fail-fast check, validation here always enumerates *every*
//! violation so callers can report or branch on the full list.
//!
//! ## Example Usage
//!
//! ```rust
//! use canon_validation::{create_validator, ValidationContext};
//! use serde_json::json;
//!
//! let schema = json!({"type": "object", "required": ["name"]});
//! let validator = create_validator(&schema).unwrap();
//!
//! let err = validator
//!     .validate(&json!({"invalid": "x"}), ValidationContext::Input)
//!     .unwrap_err();
//! assert_eq!(err.violations.len(), 1);
//! assert_eq!(err.violations[0].path, "/name");
//! ```

pub mod cache;
pub mod validator;

pub use cache::ValidatorCache;
pub use validator::{
    SchemaValidator, ValidationContext, ValidationError, Violation, create_validator,
};

use thiserror::Error;

/// Errors that can occur while preparing or running validation
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid schema {id}: {message}")]
    Schema { id: String, message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Validate `data` against `schema`, compiling the schema for this call only
///
/// # Errors
///
/// Returns [`Error::Schema`] when the schema itself is invalid and
/// [`Error::Validation`] carrying every violation when `data` does not conform.
pub fn validate_against_schema(
    data: &serde_json::Value,
    schema: &serde_json::Value,
    context: ValidationContext,
) -> Result<()> {
    let validator = create_validator(schema)?;
    validator.validate(data, context)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_convenience_validate_passes() {
        let schema = json!({"type": "object", "properties": {"name": {"type": "string"}}});
        assert!(validate_against_schema(&json!({"name": "John"}), &schema, ValidationContext::Input).is_ok());
    }

    #[test]
    fn test_convenience_validate_reports_context() {
        let schema = json!({"type": "object", "required": ["name"]});
        let err = validate_against_schema(&json!({}), &schema, ValidationContext::Output).unwrap_err();
        match err {
            Error::Validation(err) => {
                assert_eq!(err.context, ValidationContext::Output);
                assert_eq!(err.violations.len(), 1);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_schema_is_schema_error() {
        let schema = json!({"type": "not-a-type"});
        let err = validate_against_schema(&json!({}), &schema, ValidationContext::Input).unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
    }
}
