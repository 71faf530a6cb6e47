#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

//! # canon-runtime
//!
//! Transform registry loading and validated execution.
//!
//! A transform lives in the registry as a metadata sidecar
//! (`transforms/{domain}/{name}/{version}/spec.meta.yaml`) next to its
//! mapping body. Running one resolves the sidecar, verifies the body
//! checksum, validates the input, evaluates the body with the declared
//! extensions bound, and validates the output.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use canon_runtime::{RunOptions, TransformRuntime};
//! use serde_json::json;
//!
//! let runtime = TransformRuntime::default();
//! let options = RunOptions::new("registry");
//! let output = runtime
//!     .run_transform("contact/to_canonical@1-0-0", &json!({"name": "John"}), &options)
//!     .unwrap();
//! println!("{output}");
//! ```

pub mod checksum;
pub mod fixtures;
pub mod id;
pub mod loader;
pub mod meta;
pub mod runtime;

pub use checksum::{
    ChecksumStatus, checksum_bytes, compute_checksum, digests_match, verify_checksum,
};
pub use fixtures::{FixtureReport, FixtureStatus};
pub use id::TransformId;
pub use loader::{TransformSpec, discover_transforms, load_transform_spec, load_transform_spec_from_path};
pub use meta::{Checksum, Compat, Engine, Provenance, TestFixture, TransformMeta, TransformStatus};
pub use runtime::{RunOptions, TransformOutcome, TransformRuntime, run_transform};

use canon_validation::ValidationError;
use std::path::PathBuf;
use thiserror::Error;

/// Boxed cause carried by [`Error::Transform`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while loading or running a transform
#[derive(Error, Debug)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {what} (expected at {})", .path.display())]
    NotFound { what: String, path: PathBuf },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Extension '{name}' is not registered (impl '{impl_key}')")]
    ExtensionNotFound { name: String, impl_key: String },

    #[error("Checksum mismatch for {}: expected {expected}, computed {actual}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Transform {transform_id} failed: {source}")]
    Transform {
        transform_id: String,
        #[source]
        source: BoxError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn not_found(what: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            what: what.into(),
            path: path.into(),
        }
    }

    /// Wrap `cause` as the failure of `transform_id`
    pub fn transform(transform_id: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::Transform {
            transform_id: transform_id.into(),
            source: cause.into(),
        }
    }

    /// Wrap a mapping failure, letting an unregistered extension through as-is
    pub(crate) fn from_mapping(transform_id: &str, err: canon_mapping::Error) -> Self {
        match err {
            canon_mapping::Error::ExtensionNotFound { name, impl_key } => {
                Self::ExtensionNotFound { name, impl_key }
            }
            other => Self::transform(transform_id, other),
        }
    }
}

impl From<canon_schema::Error> for Error {
    fn from(err: canon_schema::Error) -> Self {
        match err {
            canon_schema::Error::Parse(message) => Self::Parse(message),
            canon_schema::Error::NotFound { uri, path } => Self::not_found(format!("schema {uri}"), path),
            canon_schema::Error::InvalidFormat { uri, message } => {
                Self::Parse(format!("schema {uri}: {message}"))
            }
            canon_schema::Error::Io(err) => Self::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
