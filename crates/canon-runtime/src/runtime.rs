//! Transform execution with schema enforcement
//!
//! Each call runs the same fixed sequence: load the spec, verify the body
//! checksum, validate the input, compile the body and bind its extensions,
//! evaluate, validate the output. Nothing is retried and nothing is written.

use crate::checksum::verify_checksum;
use crate::loader::{TransformSpec, load_transform_spec};
use crate::{Error, Result};
use canon_mapping::{
    CompiledExpression, ExpressionEngine, ExtensionRegistry, MappingEngine, register_extensions,
};
use canon_schema::{SchemaRef, SchemaStore, load_schema};
use canon_validation::{ValidationContext, ValidatorCache};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Per-call switches and the registry to resolve against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub validate_input: bool,
    pub validate_output: bool,
    pub verify_checksum: bool,
    pub registry_root: PathBuf,
}

impl RunOptions {
    /// All checks enabled against `registry_root`
    pub fn new(registry_root: impl Into<PathBuf>) -> Self {
        Self {
            validate_input: true,
            validate_output: true,
            verify_checksum: true,
            registry_root: registry_root.into(),
        }
    }

    #[must_use]
    pub fn with_input_validation(mut self, enabled: bool) -> Self {
        self.validate_input = enabled;
        self
    }

    #[must_use]
    pub fn with_output_validation(mut self, enabled: bool) -> Self {
        self.validate_output = enabled;
        self
    }

    #[must_use]
    pub fn with_checksum_verification(mut self, enabled: bool) -> Self {
        self.verify_checksum = enabled;
        self
    }
}

/// Output of a timed run
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutcome {
    pub output: Value,
    pub elapsed: Duration,
}

/// Runs transforms from a registry.
///
/// The extension registry is injected at construction and never mutated.
/// Loaded schemas and compiled validators are cached by resolved schema
/// path, so one runtime can serve several registries.
pub struct TransformRuntime<E: ExpressionEngine = MappingEngine> {
    engine: E,
    registry: ExtensionRegistry,
    schemas: Arc<SchemaStore>,
    validators: Arc<ValidatorCache>,
}

impl TransformRuntime<MappingEngine> {
    /// Runtime using the built-in mapping engine
    #[must_use]
    pub fn new(registry: ExtensionRegistry) -> Self {
        Self::with_engine(MappingEngine::new(), registry)
    }
}

impl Default for TransformRuntime<MappingEngine> {
    fn default() -> Self {
        Self::new(ExtensionRegistry::with_builtins())
    }
}

impl<E: ExpressionEngine> fmt::Debug for TransformRuntime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRuntime")
            .field("extensions", &self.registry.keys())
            .field("cached_validators", &self.validators.len())
            .finish_non_exhaustive()
    }
}

impl<E: ExpressionEngine> TransformRuntime<E> {
    pub fn with_engine(engine: E, registry: ExtensionRegistry) -> Self {
        Self {
            engine,
            registry,
            schemas: Arc::new(SchemaStore::new()),
            validators: Arc::new(ValidatorCache::new()),
        }
    }

    /// Share a validator cache with other runtimes
    #[must_use]
    pub fn with_validator_cache(mut self, validators: Arc<ValidatorCache>) -> Self {
        self.validators = validators;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    #[must_use]
    pub fn validators(&self) -> &Arc<ValidatorCache> {
        &self.validators
    }

    /// Run `transform_id` over `input` and return the output document
    ///
    /// # Errors
    ///
    /// * [`Error::ChecksumMismatch`] when the body was modified
    /// * [`Error::Validation`] when the input or output violates its schema
    /// * [`Error::ExtensionNotFound`] when a declared extension is not registered
    /// * [`Error::Transform`] wrapping any other load, compile or evaluation failure
    pub fn run_transform(&self, transform_id: &str, input: &Value, options: &RunOptions) -> Result<Value> {
        self.execute(transform_id, input, options).map(|outcome| outcome.output)
    }

    /// Like [`Self::run_transform`], also reporting how long the run took
    ///
    /// # Errors
    ///
    /// Same as [`Self::run_transform`].
    pub fn execute(&self, transform_id: &str, input: &Value, options: &RunOptions) -> Result<TransformOutcome> {
        let started = Instant::now();
        let spec = self.load(transform_id, options)?;
        let output = self.apply(transform_id, &spec, &mut None, input, options)?;
        let elapsed = started.elapsed();

        info!(transform = %transform_id, ?elapsed, "Transform completed");
        Ok(TransformOutcome { output, elapsed })
    }

    /// Run one transform over many inputs, loading and compiling it once.
    /// Stops at the first failing input.
    ///
    /// # Errors
    ///
    /// Same as [`Self::run_transform`], for the first input that fails.
    pub fn run_batch(&self, transform_id: &str, inputs: &[Value], options: &RunOptions) -> Result<Vec<Value>> {
        let spec = self.load(transform_id, options)?;
        let mut compiled = None;
        let mut outputs = Vec::with_capacity(inputs.len());

        for (index, input) in inputs.iter().enumerate() {
            trace!(transform = %transform_id, index, "Running batch item");
            match self.apply(transform_id, &spec, &mut compiled, input, options) {
                Ok(output) => outputs.push(output),
                Err(err) => {
                    warn!(transform = %transform_id, index, "Batch stopped at failing input");
                    return Err(err);
                }
            }
        }

        info!(transform = %transform_id, items = outputs.len(), "Batch completed");
        Ok(outputs)
    }

    /// Run an already loaded spec
    ///
    /// # Errors
    ///
    /// Same as [`Self::run_transform`], minus spec loading failures.
    pub fn run_spec(&self, spec: &TransformSpec, input: &Value, options: &RunOptions) -> Result<Value> {
        let label = spec_label(spec);
        self.verify(&label, spec, options)?;
        self.apply(&label, spec, &mut None, input, options)
    }

    fn load(&self, transform_id: &str, options: &RunOptions) -> Result<TransformSpec> {
        let spec = load_transform_spec(transform_id, &options.registry_root)
            .map_err(|e| Error::transform(transform_id, e))?;
        self.verify(transform_id, &spec, options)?;
        Ok(spec)
    }

    pub(crate) fn verify(&self, label: &str, spec: &TransformSpec, options: &RunOptions) -> Result<()> {
        if !options.verify_checksum {
            debug!(transform = %label, "Checksum verification disabled");
            return Ok(());
        }
        match verify_checksum(spec) {
            Ok(_) => Ok(()),
            Err(err @ Error::ChecksumMismatch { .. }) => Err(err),
            Err(err) => Err(Error::transform(label, err)),
        }
    }

    /// Validate, evaluate, validate. `compiled` is filled on first use and
    /// reused by later calls with the same spec.
    pub(crate) fn apply(
        &self,
        label: &str,
        spec: &TransformSpec,
        compiled: &mut Option<E::Compiled>,
        input: &Value,
        options: &RunOptions,
    ) -> Result<Value> {
        if options.validate_input {
            self.validate(label, &spec.source_schema, input, ValidationContext::Input, &options.registry_root)?;
        }

        let expression = match compiled.take() {
            Some(expression) => expression,
            None => self.compile(label, spec)?,
        };
        let result = expression.evaluate(input);
        *compiled = Some(expression);
        let output = result.map_err(|e| Error::transform(label, e))?;

        if options.validate_output {
            self.validate(label, &spec.target_schema, &output, ValidationContext::Output, &options.registry_root)?;
        }
        Ok(output)
    }

    fn compile(&self, label: &str, spec: &TransformSpec) -> Result<E::Compiled> {
        debug!(transform = %label, "Compiling transform body");
        let mut compiled = self
            .engine
            .compile(&spec.body)
            .map_err(|e| Error::from_mapping(label, e))?;
        register_extensions(&mut compiled, &self.registry, &spec.extensions)
            .map_err(|e| Error::from_mapping(label, e))?;
        Ok(compiled)
    }

    fn validate(
        &self,
        label: &str,
        schema: &SchemaRef,
        data: &Value,
        context: ValidationContext,
        registry_root: &Path,
    ) -> Result<()> {
        let key = registry_root.join(schema.relative_path()).to_string_lossy().into_owned();
        let document = match self.schemas.get(&key) {
            Some(document) => document,
            None => {
                let document = load_schema(&schema.to_string(), registry_root)
                    .map_err(|e| Error::transform(label, Error::from(e)))?;
                self.schemas.insert(&key, document)
            }
        };

        let validator = self
            .validators
            .get_or_compile(&key, &document.content)
            .map_err(|e| Error::transform(label, e))?;
        validator.validate(data, context)?;
        Ok(())
    }
}

/// Run a transform with a default runtime (built-in extensions only)
///
/// # Errors
///
/// Same as [`TransformRuntime::run_transform`].
pub fn run_transform(transform_id: &str, input: &Value, options: &RunOptions) -> Result<Value> {
    TransformRuntime::default().run_transform(transform_id, input, options)
}

pub(crate) fn spec_label(spec: &TransformSpec) -> String {
    format!("{}@{}", spec.id, spec.version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::checksum_bytes;
    use serde_json::json;
    use std::error::Error as _;
    use std::fs;

    const ID: &str = "contact/to_canonical@1-0-0";

    struct Registry {
        dir: tempfile::TempDir,
    }

    impl Registry {
        fn new(body: &str, checksum: Option<&str>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let registry = Self { dir };
            registry.write(
                "schemas/com.example/contact/jsonschema/1-0-0.json",
                r#"{"type": "object", "properties": {"name": {"type": "string"}}, "required": ["name"]}"#,
            );
            registry.write(
                "schemas/org.canonical/contact/jsonschema/1-0-0.json",
                r#"{"type": "object", "properties": {"displayName": {"type": "string"}}, "required": ["displayName"]}"#,
            );
            let mut meta = String::from(
                "id: contact/to_canonical\nversion: 1-0-0\nfrom_schema: iglu:com.example/contact/jsonschema/1-0-0\nto_schema: iglu:org.canonical/contact/jsonschema/1-0-0\n",
            );
            if let Some(checksum) = checksum {
                meta.push_str(&format!("checksum:\n  jsonata_sha256: {checksum}\n"));
            }
            registry.write("transforms/contact/to_canonical/1-0-0/spec.meta.yaml", &meta);
            registry.write("transforms/contact/to_canonical/1-0-0/spec.jsonata", body);
            registry
        }

        fn write(&self, rel: &str, body: &str) {
            let path = self.dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
        }

        fn options(&self) -> RunOptions {
            RunOptions::new(self.dir.path())
        }
    }

    #[test]
    fn test_run_transform_validates_both_sides() {
        let body = r#"{ "displayName": name }"#;
        let registry = Registry::new(body, Some(&checksum_bytes(body.as_bytes())));
        let runtime = TransformRuntime::default();

        let output = runtime
            .run_transform(ID, &json!({"name": "John"}), &registry.options())
            .unwrap();
        assert_eq!(output, json!({"displayName": "John"}));
        assert_eq!(runtime.validators().len(), 2);
    }

    #[test]
    fn test_invalid_output_propagates_validation_error() {
        let registry = Registry::new(r#"{ "other": name }"#, None);
        let err = TransformRuntime::default()
            .run_transform(ID, &json!({"name": "John"}), &registry.options())
            .unwrap_err();
        match err {
            Error::Validation(err) => {
                assert_eq!(err.context, ValidationContext::Output);
                assert_eq!(err.violations[0].path, "/displayName");
            }
            other => panic!("expected output validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_can_be_disabled() {
        let registry = Registry::new(r#"{ "other": name }"#, None);
        let options = registry
            .options()
            .with_input_validation(false)
            .with_output_validation(false);
        let output = TransformRuntime::default()
            .run_transform(ID, &json!({"invalid": "x"}), &options)
            .unwrap();
        assert_eq!(output, json!({}));
    }

    #[test]
    fn test_evaluation_failure_is_wrapped_with_cause() {
        let registry = Registry::new(r#"{ "displayName": name & (1 / 0) }"#, None);
        let err = TransformRuntime::default()
            .run_transform(ID, &json!({"name": "John"}), &registry.options())
            .unwrap_err();
        match &err {
            Error::Transform { transform_id, .. } => assert_eq!(transform_id, ID),
            other => panic!("expected transform error, got {other:?}"),
        }
        assert!(err.source().is_some());
    }

    #[test]
    fn test_missing_spec_is_wrapped() {
        let registry = Registry::new("$", None);
        let err = TransformRuntime::default()
            .run_transform("contact/missing@1-0-0", &json!({}), &registry.options())
            .unwrap_err();
        match err {
            Error::Transform { source, .. } => {
                assert!(source.to_string().contains("transform metadata"));
            }
            other => panic!("expected transform error, got {other:?}"),
        }
    }

    #[test]
    fn test_tampered_body_fails_before_validation() {
        let registry = Registry::new(r#"{ "displayName": name }"#, Some(&checksum_bytes(b"something else")));
        // invalid input proves the checksum runs first
        let err = TransformRuntime::default()
            .run_transform(ID, &json!({"invalid": "x"}), &registry.options())
            .unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));

        let output = TransformRuntime::default()
            .run_transform(
                ID,
                &json!({"name": "Ada"}),
                &registry.options().with_checksum_verification(false),
            )
            .unwrap();
        assert_eq!(output, json!({"displayName": "Ada"}));
    }

    #[test]
    fn test_run_batch_compiles_once_and_stops_on_failure() {
        let registry = Registry::new(r#"{ "displayName": name }"#, None);
        let runtime = TransformRuntime::default();

        let outputs = runtime
            .run_batch(ID, &[json!({"name": "A"}), json!({"name": "B"})], &registry.options())
            .unwrap();
        assert_eq!(outputs, vec![json!({"displayName": "A"}), json!({"displayName": "B"})]);

        let err = runtime
            .run_batch(ID, &[json!({"name": "A"}), json!({"nope": 1})], &registry.options())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_execute_reports_elapsed() {
        let registry = Registry::new(r#"{ "displayName": name }"#, None);
        let outcome = TransformRuntime::default()
            .execute(ID, &json!({"name": "John"}), &registry.options())
            .unwrap();
        assert_eq!(outcome.output, json!({"displayName": "John"}));
        assert!(outcome.elapsed <= Duration::from_secs(60));
    }
}
