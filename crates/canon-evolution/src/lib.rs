#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

//! # canon-evolution
//!
//! Schema evolution support: classify the changes between two schema
//! versions and mechanically patch transform bodies for the safe ones.
//!
//! Only additive changes (`ADD`) and renames (`RENAME`) are ever applied.
//! Renames are applied to the side of the transform whose schema changed
//! ([`SchemaSide`]).
//! Anything else makes the patcher refuse and hand the source back
//! unchanged together with the entries that blocked it.
//!
//! ```rust
//! use canon_evolution::{DiffKind, DiffOptions, PatchOutcome, diff_values, patch_transform};
//! use serde_json::json;
//!
//! let from = json!({"type": "object", "properties": {"name": {"type": "string"}}});
//! let to = json!({"type": "object", "properties": {
//!     "name": {"type": "string"},
//!     "phone": {"type": "string"}
//! }});
//!
//! let diff = diff_values(&from, &to, &DiffOptions::default());
//! assert_eq!(diff.len(), 1);
//! assert_eq!(diff[0].kind, DiffKind::Add);
//!
//! match patch_transform(r#"{ "name": name }"#, &diff) {
//!     PatchOutcome::Patched { patched, .. } => {
//!         assert_eq!(patched, r#"{ "name": name, "phone": phone }"#);
//!     }
//!     PatchOutcome::Refused { .. } => unreachable!(),
//! }
//! ```

pub mod differ;
pub mod patcher;

pub use differ::{
    DEFAULT_RENAME_THRESHOLD, DiffEntry, DiffKind, DiffOptions, diff_schemas, diff_values,
    levenshtein,
};
pub use patcher::{
    PatchOptions, PatchOutcome, SchemaSide, VersionBump, bump_minor, parse_diff, patch_transform,
    patch_transform_with,
};

use thiserror::Error;

/// Errors raised around diff and patch handling
///
/// Unresolvable schema changes are never errors: they surface as `COMPLEX`
/// diff entries or a refused patch.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid version '{0}' (expected MAJOR.MINOR.PATCH or MAJOR-MINOR-PATCH)")]
    InvalidVersion(String),

    #[error("Invalid diff: {0}")]
    InvalidDiff(String),

    #[error("Invalid schema side '{0}' (expected source or target)")]
    InvalidSide(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
