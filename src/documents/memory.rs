//! In-memory document store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::documents::{Document, DocumentKey, DocumentStore};
use crate::error::{Error, Result};

/// Map-backed store; each value is swapped in whole behind an `Arc`
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    entries: RwLock<HashMap<DocumentKey, Arc<Document>>>,
}

impl InMemoryDocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn put(&self, key: &DocumentKey, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let document = Arc::new(Document {
            bytes,
            content_type: content_type.to_string(),
        });
        self.entries.write().insert(key.clone(), document);
        Ok(())
    }

    async fn get(&self, key: &DocumentKey) -> Result<Document> {
        let document = self
            .entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("document {key}")))?;
        Ok(Document::clone(&document))
    }
}
