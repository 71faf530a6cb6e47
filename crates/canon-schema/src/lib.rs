#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

//! # canon-schema
//!
//! Schema identifiers, registry path resolution, and schema document loading.
//!
//! Schemas live in a registry directory laid out as
//! `schemas/{vendor}/{name}/{format}/{version}.json` and are addressed by
//! URIs of the form `scheme:vendor/name/format/version`.

pub mod loader;
pub mod model;
pub mod store;

pub use loader::{SchemaLoader, load_schema};
pub use model::{SchemaDocument, SchemaRef};
pub use store::SchemaStore;

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when resolving or loading schemas
#[derive(Error, Debug)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Schema not found: {uri} (expected at {})", .path.display())]
    NotFound { uri: String, path: PathBuf },

    #[error("Invalid schema document {uri}: {message}")]
    InvalidFormat { uri: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a parse error for a malformed identifier.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
