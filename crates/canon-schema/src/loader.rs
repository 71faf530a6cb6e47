//! Schema loader resolving registry URIs to documents on disk

use crate::model::{SchemaDocument, SchemaRef};
use crate::store::SchemaStore;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Loads schema documents from a registry directory
#[derive(Debug, Clone)]
pub struct SchemaLoader {
    registry_root: PathBuf,
    store: Arc<SchemaStore>,
}

impl SchemaLoader {
    /// Create a loader for the given registry root with a private cache
    pub fn new(registry_root: impl Into<PathBuf>) -> Self {
        Self {
            registry_root: registry_root.into(),
            store: Arc::new(SchemaStore::new()),
        }
    }

    /// Create a loader that shares an existing cache
    pub fn with_store(registry_root: impl Into<PathBuf>, store: Arc<SchemaStore>) -> Self {
        Self {
            registry_root: registry_root.into(),
            store,
        }
    }

    /// Registry root this loader reads from
    #[must_use]
    pub fn registry_root(&self) -> &Path {
        &self.registry_root
    }

    /// Absolute path a schema URI resolves to
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] when the URI is malformed.
    pub fn resolve_path(&self, uri: &str) -> Result<PathBuf> {
        let schema_ref = SchemaRef::parse(uri)?;
        Ok(self.registry_root.join(schema_ref.relative_path()))
    }

    /// Load a schema by URI, consulting the cache first
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for a malformed URI or document and
    /// [`Error::NotFound`] when the file does not exist.
    pub fn load(&self, uri: &str) -> Result<Arc<SchemaDocument>> {
        if let Some(cached) = self.store.get(uri) {
            debug!("Cache hit for schema: {}", uri);
            return Ok(cached);
        }

        trace!("Cache miss for schema: {}", uri);
        let path = self.resolve_path(uri)?;
        let document = read_schema_file(uri, &path)?;
        Ok(self.store.insert(uri, document))
    }

    /// Load a schema document directly from a file path, bypassing URI resolution
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the file does not exist and
    /// [`Error::Parse`] when it is not valid JSON.
    pub fn load_file(path: &Path) -> Result<SchemaDocument> {
        read_schema_file(&path.display().to_string(), path)
    }
}

/// Load a schema by URI from `registry_root` without caching
///
/// # Errors
///
/// Same as [`SchemaLoader::load`].
pub fn load_schema(uri: &str, registry_root: &Path) -> Result<SchemaDocument> {
    let schema_ref = SchemaRef::parse(uri)?;
    read_schema_file(uri, &registry_root.join(schema_ref.relative_path()))
}

fn read_schema_file(uri: &str, path: &Path) -> Result<SchemaDocument> {
    trace!("Loading schema from file: {:?}", path);
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound {
                uri: uri.to_string(),
                path: path.to_path_buf(),
            });
        }
        Err(err) => return Err(Error::Io(err)),
    };

    let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        Error::parse(format!("schema {uri} is not valid JSON: {e}"))
    })?;

    if !value.is_object() && !value.is_boolean() {
        return Err(Error::InvalidFormat {
            uri: uri.to_string(),
            message: "schema root must be an object or boolean".to_string(),
        });
    }

    Ok(SchemaDocument::new(uri, value))
}
