//! Concurrent cache of loaded schema documents

use crate::model::SchemaDocument;
use dashmap::DashMap;
use std::sync::Arc;

/// Thread-safe schema cache keyed by schema URI.
///
/// Population is idempotent: if two threads load the same schema at once,
/// the first inserted document wins and both callers receive it.
#[derive(Debug, Default)]
pub struct SchemaStore {
    documents: DashMap<String, Arc<SchemaDocument>>,
}

impl SchemaStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
        }
    }

    /// Insert a document unless one is already cached under `uri`
    pub fn insert(&self, uri: &str, document: SchemaDocument) -> Arc<SchemaDocument> {
        self.documents
            .entry(uri.to_string())
            .or_insert_with(|| Arc::new(document))
            .clone()
    }

    /// Get a cached document
    #[must_use]
    pub fn get(&self, uri: &str) -> Option<Arc<SchemaDocument>> {
        self.documents.get(uri).map(|entry| entry.value().clone())
    }

    /// Check if a document is cached
    #[must_use]
    pub fn contains(&self, uri: &str) -> bool {
        self.documents.contains_key(uri)
    }

    /// Drop every cached document
    pub fn clear(&self) {
        self.documents.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
