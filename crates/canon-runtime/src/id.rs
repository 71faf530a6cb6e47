//! Transform identifiers (`{domain}/{name}@{version}`)

use crate::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Directory under the registry root that holds transforms
pub const TRANSFORMS_DIR: &str = "transforms";

/// Parsed transform identifier, e.g. `email/gmail_to_canonical@1-0-0`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransformId {
    pub domain: String,
    pub name: String,
    pub version: String,
}

impl TransformId {
    /// Parse an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] when the `@` or `/` separator is missing, a
    /// segment is empty or unsafe as a directory name, or the version is not
    /// of the form `MAJOR-MINOR-PATCH`.
    pub fn parse(id: &str) -> Result<Self> {
        let (path, version) = id
            .rsplit_once('@')
            .ok_or_else(|| Error::parse(format!("transform id '{id}' is missing '@version'")))?;
        let (domain, name) = path
            .split_once('/')
            .ok_or_else(|| Error::parse(format!("transform id '{id}' is missing '/' between domain and name")))?;

        for (label, segment) in [("domain", domain), ("name", name)] {
            if !is_safe_segment(segment) {
                return Err(Error::parse(format!(
                    "transform id '{id}' has an invalid {label} '{segment}'"
                )));
            }
        }

        if !is_dashed_version(version) {
            return Err(Error::parse(format!(
                "transform id '{id}' has version '{version}', expected MAJOR-MINOR-PATCH"
            )));
        }

        Ok(Self {
            domain: domain.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    /// `{domain}/{name}` without the version
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.domain, self.name)
    }

    /// Directory of this transform relative to the registry root
    #[must_use]
    pub fn relative_dir(&self) -> PathBuf {
        PathBuf::from(TRANSFORMS_DIR)
            .join(&self.domain)
            .join(&self.name)
            .join(&self.version)
    }

    /// Sidecar path relative to the registry root
    #[must_use]
    pub fn meta_path(&self) -> PathBuf {
        self.relative_dir().join(crate::meta::META_FILE_NAME)
    }

    /// Recover the identifier from a sidecar path inside `registry_root`
    #[must_use]
    pub fn from_meta_path(registry_root: &Path, meta_path: &Path) -> Option<Self> {
        let relative = meta_path.strip_prefix(registry_root.join(TRANSFORMS_DIR)).ok()?;
        let parts: Vec<&str> = relative.iter().filter_map(|part| part.to_str()).collect();
        match parts.as_slice() {
            [domain, name, version, file] if *file == crate::meta::META_FILE_NAME => {
                Self::parse(&format!("{domain}/{name}@{version}")).ok()
            }
            _ => None,
        }
    }
}

impl fmt::Display for TransformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.domain, self.name, self.version)
    }
}

impl FromStr for TransformId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn is_dashed_version(version: &str) -> bool {
    let parts: Vec<&str> = version.split('-').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}
