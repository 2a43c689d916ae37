//! Filesystem document store
//!
//! Each key is one file: the content type on the first line, then the raw
//! bytes. Writes go to a uniquely named temp file in the same directory and
//! are renamed over the key, so a reader sees either the old value or the new
//! one, never a mix.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::documents::{Document, DocumentKey, DocumentStore};
use crate::error::{Error, Result};

const TEMP_PREFIX: &str = ".tmp-";

/// Directory-backed document store
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    /// Open (and create if needed) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &DocumentKey) -> PathBuf {
        self.root.join(key.as_str())
    }
}

fn encode(bytes: &[u8], content_type: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(content_type.len() + 1 + bytes.len());
    out.extend_from_slice(content_type.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(bytes);
    out
}

fn decode(key: &DocumentKey, mut raw: Vec<u8>) -> Result<Document> {
    let split = raw
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| Error::storage(format!("document {key} has no content type header")))?;
    let bytes = raw.split_off(split + 1);
    raw.truncate(split);
    let content_type = String::from_utf8(raw)
        .map_err(|_| Error::storage(format!("document {key} has a non-UTF-8 content type")))?;
    Ok(Document {
        bytes,
        content_type,
    })
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    #[instrument(skip(self, bytes), fields(key = %key, len = bytes.len()))]
    async fn put(&self, key: &DocumentKey, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        if content_type.contains(['\n', '\r']) {
            return Err(Error::validation("content type must be a single line"));
        }

        let temp = self
            .root
            .join(format!("{TEMP_PREFIX}{}", uuid::Uuid::new_v4()));
        let payload = encode(&bytes, content_type);

        let write = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(&payload).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&temp, self.path_for(key)).await
        };

        if let Err(err) = write.await {
            if let Err(cleanup) = tokio::fs::remove_file(&temp).await {
                if cleanup.kind() != IoErrorKind::NotFound {
                    debug!(error = %cleanup, "Temp file cleanup failed");
                }
            }
            return Err(err.into());
        }

        debug!("Document stored");
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &DocumentKey) -> Result<Document> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(raw) => decode(key, raw),
            Err(err) if err.kind() == IoErrorKind::NotFound => {
                Err(Error::not_found(format!("document {key}")))
            }
            Err(err) => Err(err.into()),
        }
    }
}
