//! Expression engine
//!
//! The runtime talks to the expression language only through the
//! [`ExpressionEngine`] and [`CompiledExpression`] traits, so another
//! evaluator can be substituted without touching the runtime.

use crate::ast::Expr;
use crate::eval::Evaluator;
use crate::extensions::ExtensionFn;
use crate::functions;
use crate::parser::parse;
use crate::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Compiles transform bodies into executable expressions
pub trait ExpressionEngine: Send + Sync {
    type Compiled: CompiledExpression;

    /// Compile expression source
    ///
    /// # Errors
    ///
    /// Returns a syntax error carrying the offset of the failing token.
    fn compile(&self, body: &str) -> Result<Self::Compiled>;
}

/// A compiled expression that extension functions can be bound into
pub trait CompiledExpression {
    /// Bind a function under `name`, callable as `$name(...)`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Binding`] when the name is already bound or is a builtin.
    fn bind(&mut self, name: &str, function: ExtensionFn) -> Result<()>;

    /// Evaluate against an input document; an undefined result becomes `null`
    ///
    /// # Errors
    ///
    /// Returns an error when evaluation or a called function fails.
    fn evaluate(&self, input: &Value) -> Result<Value>;
}

/// Default engine for the JSONata-style mapping language
#[derive(Debug, Default, Clone, Copy)]
pub struct MappingEngine;

impl MappingEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ExpressionEngine for MappingEngine {
    type Compiled = CompiledMapping;

    fn compile(&self, body: &str) -> Result<CompiledMapping> {
        let expr = parse(body)?;
        debug!(
            functions = ?expr.called_functions(),
            "Compiled mapping expression"
        );
        Ok(CompiledMapping {
            expr: Arc::new(expr),
            bindings: HashMap::new(),
        })
    }
}

/// Parsed expression plus its bound extension functions
#[derive(Clone)]
pub struct CompiledMapping {
    expr: Arc<Expr>,
    bindings: HashMap<String, ExtensionFn>,
}

impl CompiledMapping {
    /// The parsed expression tree
    #[must_use]
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    #[must_use]
    pub fn is_bound(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Called functions that are neither builtins nor bound
    #[must_use]
    pub fn unresolved_functions(&self) -> Vec<String> {
        self.expr
            .called_functions()
            .into_iter()
            .filter(|name| !functions::is_builtin(name) && !self.bindings.contains_key(name))
            .collect()
    }
}

impl CompiledExpression for CompiledMapping {
    fn bind(&mut self, name: &str, function: ExtensionFn) -> Result<()> {
        let name = name.strip_prefix('$').unwrap_or(name);

        if name.is_empty() {
            return Err(Error::Binding {
                name: name.to_string(),
                reason: "name is empty".to_string(),
            });
        }
        if functions::is_builtin(name) {
            return Err(Error::Binding {
                name: name.to_string(),
                reason: "name is a builtin function".to_string(),
            });
        }
        if self.bindings.contains_key(name) {
            return Err(Error::Binding {
                name: name.to_string(),
                reason: "name is already bound".to_string(),
            });
        }

        trace!(name, "Binding extension function");
        self.bindings.insert(name.to_string(), function);
        Ok(())
    }

    fn evaluate(&self, input: &Value) -> Result<Value> {
        let result = Evaluator::new(input, &self.bindings).evaluate(&self.expr)?;
        Ok(result.unwrap_or(Value::Null))
    }
}

impl std::fmt::Debug for CompiledMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut bound: Vec<&String> = self.bindings.keys().collect();
        bound.sort();
        f.debug_struct("CompiledMapping")
            .field("expr", &self.expr)
            .field("bindings", &bound)
            .finish()
    }
}
