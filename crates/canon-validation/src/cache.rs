//! Compiled validator cache keyed by schema identity

use crate::validator::{SchemaValidator, create_validator};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// Thread-safe cache of compiled validators.
///
/// Compilation happens outside the map lock, so two threads racing on the
/// same key may both compile; the first insert wins and the duplicate is
/// dropped.
#[derive(Debug, Default)]
pub struct ValidatorCache {
    validators: DashMap<String, Arc<SchemaValidator>>,
}

impl ValidatorCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            validators: DashMap::new(),
        }
    }

    /// Get the validator cached under `key`, compiling `schema` on a miss
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Schema`] when `schema` fails to compile.
    pub fn get_or_compile(&self, key: &str, schema: &Value) -> crate::Result<Arc<SchemaValidator>> {
        if let Some(validator) = self.validators.get(key) {
            trace!("Validator cache hit: {}", key);
            return Ok(validator.value().clone());
        }

        debug!("Compiling validator for schema: {}", key);
        let compiled = Arc::new(create_validator(schema)?);
        Ok(self
            .validators
            .entry(key.to_string())
            .or_insert(compiled)
            .clone())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.validators.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}
