//! Transform spec loading and registry discovery

use crate::id::{TRANSFORMS_DIR, TransformId};
use crate::meta::{Compat, Engine, META_FILE_NAME, Provenance, TestFixture, TransformMeta, TransformStatus};
use crate::{Error, Result};
use canon_mapping::ExtensionRef;
use canon_schema::SchemaRef;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// A transform resolved from the registry: metadata plus body source
#[derive(Debug, Clone, PartialEq)]
pub struct TransformSpec {
    pub id: String,
    pub version: String,
    pub source_schema: SchemaRef,
    pub target_schema: SchemaRef,
    pub extensions: Vec<ExtensionRef>,
    pub body: String,
    pub checksum: Option<String>,
    pub engine: Engine,
    pub status: TransformStatus,
    pub provenance: Option<Provenance>,
    pub tests: Vec<TestFixture>,
    pub compat: Option<Compat>,
    pub meta_path: PathBuf,
    pub body_path: PathBuf,
}

impl TransformSpec {
    /// Directory containing the sidecar
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        self.meta_path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Resolve a sidecar-relative path, refusing anything that escapes the
    /// transform directory
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for absolute paths or `..` components.
    pub fn resolve_relative(&self, relative: &str) -> Result<PathBuf> {
        confined_join(self.base_dir(), relative)
    }
}

/// Load a transform by identifier from `registry_root`
///
/// # Errors
///
/// Returns [`Error::Parse`] for a malformed identifier or sidecar and
/// [`Error::NotFound`] when the sidecar or body file is missing.
pub fn load_transform_spec(transform_id: &str, registry_root: &Path) -> Result<TransformSpec> {
    let id = TransformId::parse(transform_id)?;
    let meta_path = registry_root.join(id.meta_path());
    let spec = load_transform_spec_from_path(&meta_path)?;

    if spec.id != id.key() && spec.id != id.to_string() {
        warn!(
            transform_id = %id,
            declared = %spec.id,
            "Sidecar id does not match the registry location"
        );
    }

    Ok(spec)
}

/// Load a transform from its sidecar path
///
/// # Errors
///
/// Same as [`load_transform_spec`].
pub fn load_transform_spec_from_path(meta_path: &Path) -> Result<TransformSpec> {
    trace!("Loading transform metadata from {:?}", meta_path);
    let yaml = read_text(meta_path, "transform metadata")?;
    let meta = TransformMeta::parse(&yaml)
        .map_err(|e| Error::parse(format!("{}: {e}", meta_path.display())))?;

    let base_dir = meta_path.parent().unwrap_or_else(|| Path::new("."));
    let body_path = confined_join(base_dir, &meta.spec_path)?;
    let body = read_text(&body_path, "transform body")?;

    let source_schema = SchemaRef::parse(&meta.from_schema)?;
    let target_schema = SchemaRef::parse(&meta.to_schema)?;

    debug!(
        id = %meta.id,
        version = %meta.version,
        extensions = meta.extensions.len(),
        "Loaded transform spec"
    );

    let checksum = meta.recorded_checksum().map(str::to_string);
    Ok(TransformSpec {
        id: meta.id,
        version: meta.version,
        source_schema,
        target_schema,
        extensions: meta.extensions,
        body,
        checksum,
        engine: meta.engine,
        status: meta.status,
        provenance: meta.provenance,
        tests: meta.tests,
        compat: meta.compat,
        meta_path: meta_path.to_path_buf(),
        body_path,
    })
}

/// Every sidecar under `{registry_root}/transforms`, sorted by path
///
/// # Errors
///
/// Returns [`Error::NotFound`] when `registry_root` does not exist and
/// [`Error::Io`] when a directory cannot be read.
pub fn discover_transforms(registry_root: &Path) -> Result<Vec<PathBuf>> {
    if !registry_root.is_dir() {
        return Err(Error::not_found("registry root", registry_root));
    }

    let transforms_dir = registry_root.join(TRANSFORMS_DIR);
    if !transforms_dir.is_dir() {
        debug!("No transforms directory under {:?}", registry_root);
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(&transforms_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            Error::Io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            )
        })?;
        if entry.file_type().is_file() && entry.file_name() == META_FILE_NAME {
            found.push(entry.into_path());
        }
    }
    found.sort();

    debug!("Discovered {} transform(s) under {:?}", found.len(), transforms_dir);
    Ok(found)
}

fn read_text(path: &Path, what: &str) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(Error::not_found(what, path)),
        Err(err) if err.kind() == std::io::ErrorKind::InvalidData => Err(Error::parse(format!(
            "{what} {} is not valid UTF-8",
            path.display()
        ))),
        Err(err) => Err(Error::Io(err)),
    }
}

fn confined_join(base: &Path, relative: &str) -> Result<PathBuf> {
    let candidate = Path::new(relative);
    let escapes = candidate
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.is_empty() || escapes {
        return Err(Error::parse(format!(
            "path '{relative}' must stay inside the transform directory"
        )));
    }
    Ok(base.join(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const META: &str = "id: contact/to_canonical\nversion: 1-0-0\nfrom_schema: iglu:com.example/contact/jsonschema/1-0-0\nto_schema: iglu:org.canonical/contact/jsonschema/1-0-0\n";

    fn write(root: &Path, rel: &str, body: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_spec_by_id() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "transforms/contact/to_canonical/1-0-0/spec.meta.yaml", META);
        write(dir.path(), "transforms/contact/to_canonical/1-0-0/spec.jsonata", "{ \"n\": name }");

        let spec = load_transform_spec("contact/to_canonical@1-0-0", dir.path()).unwrap();
        assert_eq!(spec.id, "contact/to_canonical");
        assert_eq!(spec.body, "{ \"n\": name }");
        assert_eq!(spec.source_schema.name, "contact");
        assert_eq!(spec.target_schema.vendor, "org.canonical");
        assert!(spec.body_path.ends_with("1-0-0/spec.jsonata"));
        assert!(spec.checksum.is_none());
    }

    #[test]
    fn test_missing_sidecar_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_transform_spec("contact/to_canonical@1-0-0", dir.path()).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_missing_body_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "transforms/contact/to_canonical/1-0-0/spec.meta.yaml", META);
        match load_transform_spec("contact/to_canonical@1-0-0", dir.path()).unwrap_err() {
            Error::NotFound { what, path } => {
                assert_eq!(what, "transform body");
                assert!(path.ends_with("spec.jsonata"));
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_id_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_transform_spec("contact-to-canonical", dir.path()).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_spec_path_cannot_escape() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "secret.jsonata", "$$");
        write(
            dir.path(),
            "transforms/contact/to_canonical/1-0-0/spec.meta.yaml",
            &format!("{META}spec_path: ../../../../secret.jsonata\n"),
        );
        let err = load_transform_spec("contact/to_canonical@1-0-0", dir.path()).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));

        assert!(confined_join(Path::new("/base"), "/etc/passwd").is_err());
        assert!(confined_join(Path::new("/base"), "").is_err());
        assert_eq!(
            confined_join(Path::new("/base"), "bodies/spec.jsonata").unwrap(),
            PathBuf::from("/base/bodies/spec.jsonata")
        );
    }

    #[test]
    fn test_bad_schema_uri_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "transforms/contact/to_canonical/1-0-0/spec.meta.yaml",
            "id: contact/to_canonical\nversion: 1-0-0\nfrom_schema: contact\nto_schema: iglu:a/b/jsonschema/1-0-0\n",
        );
        write(dir.path(), "transforms/contact/to_canonical/1-0-0/spec.jsonata", "$");
        let err = load_transform_spec("contact/to_canonical@1-0-0", dir.path()).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_discover_transforms_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "transforms/b/two/1-0-0/spec.meta.yaml", META);
        write(dir.path(), "transforms/a/one/1-1-0/spec.meta.yaml", META);
        write(dir.path(), "transforms/a/one/1-0-0/spec.meta.yaml", META);
        write(dir.path(), "transforms/a/one/1-0-0/notes.yaml", "x: 1");

        let found = discover_transforms(dir.path()).unwrap();
        let ids: Vec<String> = found
            .iter()
            .filter_map(|p| TransformId::from_meta_path(dir.path(), p))
            .map(|id| id.to_string())
            .collect();
        assert_eq!(ids, vec!["a/one@1-0-0", "a/one@1-1-0", "b/two@1-0-0"]);
    }

    #[test]
    fn test_discover_empty_and_missing_registry() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_transforms(dir.path()).unwrap().is_empty());
        assert!(matches!(
            discover_transforms(&dir.path().join("nope")),
            Err(Error::NotFound { .. })
        ));
    }
}
