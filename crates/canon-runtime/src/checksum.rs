//! Body checksums for tamper detection

use crate::loader::TransformSpec;
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, warn};

/// Outcome of a successful checksum check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumStatus {
    /// Body bytes match the recorded digest
    Verified,
    /// The sidecar records no digest
    Unrecorded,
}

/// Lowercase hex SHA-256 of `bytes`
#[must_use]
pub fn checksum_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Lowercase hex SHA-256 of the file at `path`
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the file is missing and [`Error::Io`]
/// for other read failures.
pub fn compute_checksum(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::not_found("transform body", path)
        } else {
            Error::Io(err)
        }
    })?;
    Ok(checksum_bytes(&bytes))
}

/// Whether two hex digests are equal, ignoring hex letter case
#[must_use]
pub fn digests_match(actual: &str, expected: &str) -> bool {
    actual.eq_ignore_ascii_case(expected)
}

/// Compare the body that will be compiled with the digest recorded in the
/// sidecar
///
/// The digest covers `spec.body` as held in memory, so an edit made after
/// loading is caught as well as one made on disk before it.
///
/// # Errors
///
/// Returns [`Error::ChecksumMismatch`] when the digests differ.
pub fn verify_checksum(spec: &TransformSpec) -> Result<ChecksumStatus> {
    let Some(expected) = spec.checksum.as_deref() else {
        warn!(transform = %spec.id, "No checksum recorded; skipping verification");
        return Ok(ChecksumStatus::Unrecorded);
    };

    let actual = checksum_bytes(spec.body.as_bytes());
    if !digests_match(&actual, expected) {
        return Err(Error::ChecksumMismatch {
            path: spec.body_path.clone(),
            expected: expected.to_string(),
            actual,
        });
    }

    debug!(transform = %spec.id, "Checksum verified");
    Ok(ChecksumStatus::Verified)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            checksum_bytes(b"foo"),
            "2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae"
        );
        assert_eq!(
            checksum_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_compute_checksum_reads_file_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.jsonata");
        std::fs::write(&path, "foo").unwrap();
        assert_eq!(compute_checksum(&path).unwrap(), checksum_bytes(b"foo"));
    }

    #[test]
    fn test_single_byte_change_alters_digest() {
        assert_ne!(checksum_bytes(b"{ \"a\": b }"), checksum_bytes(b"{ \"a\": c }"));
    }

    #[test]
    fn test_digest_comparison_ignores_case() {
        let digest = checksum_bytes(b"foo");
        assert!(digests_match(&digest, &digest.to_uppercase()));
        assert!(!digests_match(&digest, &checksum_bytes(b"bar")));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = compute_checksum(&dir.path().join("missing.jsonata")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
