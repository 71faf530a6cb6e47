#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

//! # canon-mapping
//!
//! Mapping expression language, evaluator, and extension API for transforms.
//!
//! Transform bodies are written in a JSONata-style expression language: an
//! object constructor whose values are paths into the input document,
//! literals, operators, and `$function(...)` calls. Extension functions are
//! resolved from an [`ExtensionRegistry`] and bound into a compiled
//! expression under the symbol the transform declares.
//!
//! ```rust
//! use canon_mapping::{CompiledExpression, ExpressionEngine, MappingEngine};
//! use serde_json::json;
//!
//! let compiled = MappingEngine::new()
//!     .compile(r#"{ "displayName": name, "initial": $substring(name, 0, 1) }"#)
//!     .unwrap();
//! let output = compiled.evaluate(&json!({"name": "John"})).unwrap();
//! assert_eq!(output, json!({"displayName": "John", "initial": "J"}));
//! ```

pub mod ast;
pub mod engine;
pub mod eval;
pub mod extensions;
pub mod functions;
pub mod html;
pub mod lexer;
pub mod parser;

pub use engine::{CompiledExpression, CompiledMapping, ExpressionEngine, MappingEngine};
pub use extensions::{
    Extension, ExtensionFn, ExtensionRef, ExtensionRegistry, ExtensionRegistryBuilder,
    register_extensions,
};

use thiserror::Error;

/// Errors that can occur while compiling or evaluating mappings
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("Evaluation error: {0}")]
    Evaluate(String),

    #[error("Function ${name} failed: {message}")]
    Function { name: String, message: String },

    #[error("Extension error: {0}")]
    Extension(String),

    #[error("Cannot bind ${name}: {reason}")]
    Binding { name: String, reason: String },

    #[error("Extension not found: ${name} requires implementation '{impl_key}'")]
    ExtensionNotFound { name: String, impl_key: String },

    #[error("Invalid extension key '{0}' (expected namespace.function@version)")]
    InvalidExtensionKey(String),
}

impl Error {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn evaluate(message: impl Into<String>) -> Self {
        Self::Evaluate(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
