//! Subcommand implementations
//!
//! Every command returns the JSON document to print on success. Nothing is
//! written to stdout before a command has fully succeeded.

pub mod evolution;
pub mod transform;
pub mod validate;

use crate::config::CanonConfig;
use anyhow::{Context, Result};
use canon_schema::{SchemaDocument, SchemaLoader, load_schema};
use serde_json::Value;
use std::io::Read;
use std::path::Path;

/// Read a JSON document from `path`, or from stdin when no path is given
pub(crate) fn read_json_input(path: Option<&Path>) -> Result<Value> {
    let (text, origin) = match path {
        Some(path) => (
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
            path.display().to_string(),
        ),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            (text, "stdin".to_string())
        }
    };
    serde_json::from_str(&text).with_context(|| format!("{origin} does not contain valid JSON"))
}

/// Load a schema given either a file path or a registry URI
pub(crate) fn resolve_schema(config: &CanonConfig, schema: &str) -> Result<SchemaDocument> {
    let path = Path::new(schema);
    if path.is_file() {
        return SchemaLoader::load_file(path).with_context(|| format!("failed to load schema {schema}"));
    }
    load_schema(schema, &config.registry_root).with_context(|| format!("failed to load schema {schema}"))
}
