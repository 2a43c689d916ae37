//! Document storage
//!
//! Generated documents live in a key/value store keyed by
//! `{documentId}.html`. Overwriting a key is allowed (regeneration) and never
//! exposes a partially written value to a concurrent reader.

pub mod fs;
pub mod memory;

use std::fmt;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::error::{Error, Result};

pub use fs::FsDocumentStore;
pub use memory::InMemoryDocumentStore;

/// Extension appended to every document id
pub const DOCUMENT_EXTENSION: &str = "html";

/// Content type used when the caller does not supply one
pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

fn document_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("static regex"))
}

/// Check that a document id is safe to embed in keys, paths and URLs
pub fn validate_document_id(document_id: &str) -> Result<()> {
    if document_id_pattern().is_match(document_id) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "invalid documentId {document_id:?}: expected 1-128 characters of [A-Za-z0-9_-]"
        )))
    }
}

/// Storage key derived from a document id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey(String);

impl DocumentKey {
    /// Derive the key for a document id
    pub fn for_document(document_id: &str) -> Result<Self> {
        validate_document_id(document_id)?;
        Ok(Self(format!("{document_id}.{DOCUMENT_EXTENSION}")))
    }

    /// The key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Raw bytes, exactly as stored
    pub bytes: Vec<u8>,
    /// MIME type served with the bytes
    pub content_type: String,
}

/// Key/value store for generated documents
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Write or overwrite the value under `key`
    async fn put(&self, key: &DocumentKey, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Read the value under `key`
    ///
    /// # Errors
    ///
    /// `Error::NotFound` when nothing is stored under the key.
    async fn get(&self, key: &DocumentKey) -> Result<Document>;
}
