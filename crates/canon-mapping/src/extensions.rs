//! Extension API
//!
//! Extension functions are pure `fn(&[Value]) -> Result<Value>` closures
//! addressed by an implementation key of the form
//! `{namespace}.{function}@{version}`. They are grouped in versioned
//! [`Extension`] bundles and collected into an immutable
//! [`ExtensionRegistry`] that is built once and shared by reference.

use crate::engine::CompiledExpression;
use crate::html;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Type alias for extension function
pub type ExtensionFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// A transform's request for an extension: bind `impl_key` under `name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRef {
    /// Symbol used in the expression, with or without the leading `$`
    pub name: String,

    /// Implementation key, e.g. `html.to_markdown@1.0.0`
    #[serde(rename = "impl")]
    pub impl_key: String,
}

impl ExtensionRef {
    pub fn new(name: impl Into<String>, impl_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            impl_key: impl_key.into(),
        }
    }
}

/// Split an implementation key into `(namespace, function, version)`
///
/// # Errors
///
/// Returns [`Error::InvalidExtensionKey`] unless the key has the shape
/// `namespace.function@version` with non-empty parts.
pub fn parse_impl_key(key: &str) -> Result<(&str, &str, &str)> {
    let invalid = || Error::InvalidExtensionKey(key.to_string());
    let (qualified, version) = key.rsplit_once('@').ok_or_else(invalid)?;
    let (namespace, function) = qualified.split_once('.').ok_or_else(invalid)?;

    let well_formed = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    };
    if !well_formed(namespace) || !well_formed(function) || !well_formed(version) {
        return Err(invalid());
    }
    Ok((namespace, function, version))
}

/// A versioned bundle of extension functions sharing one namespace
#[derive(Clone)]
pub struct Extension {
    /// Namespace, the first segment of every key
    pub namespace: String,

    /// Version shared by every function in the bundle
    pub version: String,

    functions: Vec<(String, ExtensionFn)>,
}

impl Extension {
    /// Create an empty extension
    pub fn new(namespace: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            version: version.into(),
            functions: Vec::new(),
        }
    }

    /// Register a function
    pub fn register_function(
        &mut self,
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> &mut Self {
        self.functions.push((name.into(), Arc::new(func)));
        self
    }

    /// Implementation key for one of this extension's functions
    #[must_use]
    pub fn key_for(&self, function: &str) -> String {
        format!("{}.{function}@{}", self.namespace, self.version)
    }

    /// Keys of all registered functions, in registration order
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.functions
            .iter()
            .map(|(name, _)| self.key_for(name))
            .collect()
    }
}

impl std::fmt::Debug for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extension")
            .field("namespace", &self.namespace)
            .field("version", &self.version)
            .field(
                "functions",
                &self.functions.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Builder collecting extensions before the registry is frozen
#[derive(Default)]
pub struct ExtensionRegistryBuilder {
    functions: HashMap<String, ExtensionFn>,
}

impl ExtensionRegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every function of an extension bundle
    ///
    /// # Errors
    ///
    /// Returns an error if a key is malformed or already registered.
    pub fn extension(mut self, extension: &Extension) -> Result<Self> {
        for (name, function) in &extension.functions {
            self.insert(extension.key_for(name), Arc::clone(function))?;
        }
        debug!(
            namespace = %extension.namespace,
            version = %extension.version,
            functions = extension.functions.len(),
            "Registered extension"
        );
        Ok(self)
    }

    /// Add one function under a full implementation key
    ///
    /// # Errors
    ///
    /// Returns an error if the key is malformed or already registered.
    pub fn function(
        mut self,
        key: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Result<Self> {
        self.insert(key.into(), Arc::new(func))?;
        Ok(self)
    }

    fn insert(&mut self, key: String, function: ExtensionFn) -> Result<()> {
        parse_impl_key(&key)?;
        if self.functions.contains_key(&key) {
            return Err(Error::Extension(format!(
                "implementation '{key}' is already registered"
            )));
        }
        trace!(key = %key, "Registered extension function");
        self.functions.insert(key, function);
        Ok(())
    }

    /// Freeze into an immutable, cheaply clonable registry
    #[must_use]
    pub fn build(self) -> ExtensionRegistry {
        ExtensionRegistry {
            functions: Arc::new(self.functions),
        }
    }
}

/// Immutable table of extension implementations keyed by implementation key
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    functions: Arc<HashMap<String, ExtensionFn>>,
}

impl ExtensionRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> ExtensionRegistryBuilder {
        ExtensionRegistryBuilder::new()
    }

    /// Builder preloaded with the built-in extensions
    ///
    /// # Errors
    ///
    /// Returns an error only if the built-in keys collide, which they do not.
    pub fn builtins_builder() -> Result<ExtensionRegistryBuilder> {
        ExtensionRegistryBuilder::new()
            .extension(&create_html_extension())?
            .extension(&create_text_extension())
    }

    /// Registry containing only the built-in extensions
    ///
    /// Built through [`Self::builtins_builder`]; should the built-ins ever
    /// fail to register, the failure is logged and the registry is empty.
    #[must_use]
    pub fn with_builtins() -> Self {
        match Self::builtins_builder() {
            Ok(builder) => builder.build(),
            Err(err) => {
                error!(error = %err, "Built-in extensions failed to register");
                Self::new()
            }
        }
    }

    /// Resolve an extension reference to its implementation
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExtensionNotFound`] naming both the symbol and the key.
    pub fn resolve(&self, reference: &ExtensionRef) -> Result<ExtensionFn> {
        self.functions
            .get(&reference.impl_key)
            .cloned()
            .ok_or_else(|| Error::ExtensionNotFound {
                name: reference.name.clone(),
                impl_key: reference.impl_key.clone(),
            })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<ExtensionFn> {
        self.functions.get(key).cloned()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.functions.contains_key(key)
    }

    /// Registered keys, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.functions.keys().cloned().collect();
        keys.sort();
        keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

/// Resolve each reference and bind it into `compiled`, in declaration order
///
/// # Errors
///
/// Returns [`Error::ExtensionNotFound`] for an unregistered implementation
/// and [`Error::Binding`] when a name is bound twice or shadows a builtin.
pub fn register_extensions<C: CompiledExpression>(
    compiled: &mut C,
    registry: &ExtensionRegistry,
    refs: &[ExtensionRef],
) -> Result<()> {
    for reference in refs {
        let function = registry.resolve(reference)?;
        compiled.bind(&reference.name, function)?;
        debug!(
            name = %reference.name,
            impl_key = %reference.impl_key,
            "Bound extension"
        );
    }
    Ok(())
}

/// First argument as text; null and non-string values read as empty
fn text_arg(args: &[Value]) -> String {
    match args.first() {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Built-in `html` extension
#[must_use]
pub fn create_html_extension() -> Extension {
    let mut ext = Extension::new("html", "1.0.0");
    ext.register_function("to_markdown", |args| {
        Ok(Value::String(html::html_to_markdown(&text_arg(args))))
    });
    ext
}

/// Built-in `text` extension
#[must_use]
pub fn create_text_extension() -> Extension {
    let mut ext = Extension::new("text", "1.0.0");
    ext.register_function("normalize_whitespace", |args| {
        Ok(Value::String(html::normalize_whitespace(&text_arg(args))))
    })
    .register_function("strip_html", |args| {
        Ok(Value::String(html::strip_html(&text_arg(args))))
    });
    ext
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ExpressionEngine, MappingEngine};
    use serde_json::json;

    #[test]
    fn test_parse_impl_key() {
        assert_eq!(
            parse_impl_key("html.to_markdown@1.0.0").unwrap(),
            ("html", "to_markdown", "1.0.0")
        );
        assert!(parse_impl_key("html.to_markdown").is_err());
        assert!(parse_impl_key("to_markdown@1.0.0").is_err());
        assert!(parse_impl_key(".x@1").is_err());
        assert!(parse_impl_key("a.b@").is_err());
    }

    #[test]
    fn test_builtin_registry_keys() {
        let registry = ExtensionRegistry::with_builtins();
        assert_eq!(
            registry.keys(),
            vec![
                "html.to_markdown@1.0.0",
                "text.normalize_whitespace@1.0.0",
                "text.strip_html@1.0.0",
            ]
        );
        assert_eq!(
            ExtensionRegistry::builtins_builder().unwrap().build().len(),
            registry.len()
        );
    }

    #[test]
    fn test_builtins_go_through_duplicate_checks() {
        let builder = ExtensionRegistry::builtins_builder().unwrap();
        let err = builder.extension(&create_html_extension()).err().unwrap();
        assert!(err.to_string().contains("html.to_markdown@1.0.0"));
    }

    #[test]
    fn test_html_extension_handles_null() {
        let registry = ExtensionRegistry::with_builtins();
        let f = registry.get("html.to_markdown@1.0.0").unwrap();
        assert_eq!(f(&[Value::Null]).unwrap(), json!(""));
        assert_eq!(f(&[]).unwrap(), json!(""));
        assert_eq!(
            f(&[json!("<p>Hello <strong>world</strong></p>")]).unwrap(),
            json!("Hello **world**")
        );
    }

    #[test]
    fn test_resolve_unknown_names_symbol_and_key() {
        let registry = ExtensionRegistry::with_builtins();
        let err = registry
            .resolve(&ExtensionRef::new("$foo", "foo.bar@9.9.9"))
            .err()
            .unwrap();
        assert_eq!(
            err,
            Error::ExtensionNotFound {
                name: "$foo".to_string(),
                impl_key: "foo.bar@9.9.9".to_string(),
            }
        );
    }

    #[test]
    fn test_builder_rejects_duplicates_and_bad_keys() {
        let result = ExtensionRegistry::builder()
            .function("math.double@1.0.0", |_| Ok(json!(0)))
            .and_then(|b| b.function("math.double@1.0.0", |_| Ok(json!(1))));
        assert!(result.is_err());

        let result = ExtensionRegistry::builder().function("nodots", |_| Ok(Value::Null));
        assert!(matches!(result, Err(Error::InvalidExtensionKey(_))));
    }

    #[test]
    fn test_register_extensions_binds_in_order() {
        let registry = ExtensionRegistry::with_builtins();
        let mut compiled = MappingEngine::new()
            .compile(r#"{ "content": $htmlToMarkdown(html), "plain": $strip(html) }"#)
            .unwrap();
        register_extensions(
            &mut compiled,
            &registry,
            &[
                ExtensionRef::new("$htmlToMarkdown", "html.to_markdown@1.0.0"),
                ExtensionRef::new("strip", "text.strip_html@1.0.0"),
            ],
        )
        .unwrap();

        let output = compiled
            .evaluate(&json!({"html": "<p>Hi <em>there</em></p>"}))
            .unwrap();
        assert_eq!(output, json!({"content": "Hi _there_", "plain": "Hi there"}));
    }

    #[test]
    fn test_register_extensions_refuses_double_binding() {
        let registry = ExtensionRegistry::with_builtins();
        let mut compiled = MappingEngine::new().compile("$md(x)").unwrap();
        let refs = [
            ExtensionRef::new("md", "html.to_markdown@1.0.0"),
            ExtensionRef::new("md", "text.strip_html@1.0.0"),
        ];
        assert!(matches!(
            register_extensions(&mut compiled, &registry, &refs),
            Err(Error::Binding { .. })
        ));
    }

    #[test]
    fn test_extension_ref_serde_uses_impl() {
        let parsed: ExtensionRef =
            serde_json::from_str(r#"{"name": "$md", "impl": "html.to_markdown@1.0.0"}"#).unwrap();
        assert_eq!(parsed.impl_key, "html.to_markdown@1.0.0");
    }

    #[test]
    fn test_registry_is_shareable_across_threads() {
        let registry = ExtensionRegistry::with_builtins();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let f = registry.get("text.normalize_whitespace@1.0.0").unwrap();
                    f(&[json!(format!("  a   {i} "))]).unwrap()
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), json!(format!("a {i}")));
        }
    }
}
